//! Playback provider capability trait.

use crate::error::Result;
use crate::track::Track;
use async_trait::async_trait;

/// Abstract surface over whatever drives playback: a streaming backend, a
/// local player, or the simulated demo player. The session cannot tell the
/// implementations apart.
#[async_trait]
pub trait PlaybackProvider: Send + Sync {
    /// Human-readable provider name for logging.
    fn name(&self) -> &'static str;

    /// Snapshot of the current track, or `Ok(None)` when nothing is
    /// playing.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend cannot be reached; the session
    /// treats this as a transient connectivity failure and keeps the last
    /// known state on display.
    async fn current(&self) -> Result<Option<Track>>;
}
