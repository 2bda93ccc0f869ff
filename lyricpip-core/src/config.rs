use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub lyrics: LyricsConfig,
    #[serde(default)]
    pub offsets: OffsetsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Bound on a single playback query before the tick counts as failed
    #[serde(default = "default_query_timeout")]
    pub query_timeout_ms: u64,
    /// Bound on a full lyrics resolution pass
    #[serde(default = "default_resolve_timeout")]
    pub resolve_timeout_ms: u64,
}

const fn default_poll_interval() -> u64 {
    1000
}

const fn default_query_timeout() -> u64 {
    5000
}

const fn default_resolve_timeout() -> u64 {
    30_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            query_timeout_ms: default_query_timeout(),
            resolve_timeout_ms: default_resolve_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LyricsConfig {
    /// Source priority: lyrics sources are tried in order
    #[serde(default = "default_sources")]
    pub providers: Vec<LyricsProviderType>,
    /// Musixmatch desktop usertoken; the provider yields nothing without it
    pub musixmatch_usertoken: Option<String>,
}

fn default_sources() -> Vec<LyricsProviderType> {
    vec![LyricsProviderType::Musixmatch, LyricsProviderType::Lrclib]
}

impl Default for LyricsConfig {
    fn default() -> Self {
        Self {
            providers: default_sources(),
            musixmatch_usertoken: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LyricsProviderType {
    Musixmatch,
    Lrclib,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OffsetsConfig {
    /// Override for the offset cache file location
    pub file: Option<PathBuf>,
}

impl OffsetsConfig {
    /// Resolved offset cache path (configured override or the default).
    #[must_use]
    pub fn file_path(&self) -> PathBuf {
        self.file
            .clone()
            .unwrap_or_else(crate::paths::offset_cache_path)
    }
}

impl Config {
    /// Load the config file, writing a commented template on first run.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if a loaded config fails validation.
    pub fn load_or_create() -> Result<Self> {
        let path = crate::paths::config_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, build_config_template())?;
            info!("Created config template at {:?}", path);
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load and validate a config file from an explicit path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.sync.poll_interval_ms == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "sync.poll_interval_ms must be greater than 0".to_string(),
            });
        }
        if self.sync.query_timeout_ms == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "sync.query_timeout_ms must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Build the commented config template written on first run.
#[must_use]
pub fn build_config_template() -> String {
    r#"# lyricpip configuration

[sync]
# Playback poll cadence in milliseconds
poll_interval_ms = 1000
# Bound on a single playback query before the tick counts as failed
query_timeout_ms = 5000
# Bound on a full lyrics resolution pass
resolve_timeout_ms = 30000

[lyrics]
# Source priority: lyrics sources are tried in order; the first one that
# returns lyrics wins
providers = ["musixmatch", "lrclib"]
# Musixmatch desktop usertoken; leave unset to disable the source
# musixmatch_usertoken = "..."

[offsets]
# Override the offset cache location
# (defaults to ~/.config/lyricpip/offset_cache.json)
# file = "/path/to/offset_cache.json"
"#
    .to_string()
}
