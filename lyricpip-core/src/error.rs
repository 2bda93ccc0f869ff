use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // Configuration errors
    #[error("Invalid config: {message}")]
    ConfigInvalid { message: String },

    #[error("Failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Playback errors
    #[error("Playback provider unavailable: {reason}")]
    PlaybackUnavailable { reason: String },

    // Lyrics errors
    #[error("Lyrics source {source_name} failed: {reason}")]
    SourceFailed {
        source_name: String,
        reason: String,
    },

    // Offset cache errors
    #[error("Failed to persist offset cache to {path}: {source}")]
    OffsetPersist {
        path: PathBuf,
        source: std::io::Error,
    },

    // Network errors
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Network request failed: {0}")]
    NetworkMiddleware(#[from] reqwest_middleware::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
