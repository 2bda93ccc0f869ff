pub mod block;
pub mod config;
pub mod error;
pub mod lrc;
pub mod offsets;
pub mod paths;
pub mod provider;
pub mod resolver;
pub mod session;
pub mod sim;
pub mod source;
pub mod track;

pub use block::{
    apply_manual_offset, locate, BlockPosition, LyricsBlock, LyricsDocument, LyricsQuality,
};
pub use config::{
    build_config_template, Config, LyricsConfig, LyricsProviderType, OffsetsConfig, SyncConfig,
};
pub use error::{CoreError, Result};
pub use offsets::{AnchorPoint, OffsetCache, OffsetEntry, OffsetStore, ANCHOR_WINDOW_MS};
pub use provider::LyricsSource;
pub use resolver::{is_likely_instrumental_title, LyricsResolver};
pub use session::{SessionEvent, SessionPhase, SyncSession, SyncState};
pub use sim::SimulatedPlayback;
pub use source::PlaybackProvider;
pub use track::Track;
