//! Lyrics source capability trait.

use crate::block::LyricsDocument;
use crate::error::Result;
use crate::track::Track;
use async_trait::async_trait;

/// A ranked lyrics source: one backend capable of instrumental detection
/// and timed-lyrics retrieval.
///
/// Sources are handed to the resolver as an explicit, ordered list at
/// construction time; there is no global registry, and the order is the
/// quality ranking.
#[async_trait]
pub trait LyricsSource: Send + Sync {
    /// Stable name used for provenance tags and logging.
    fn name(&self) -> &'static str;

    /// Whether this source affirmatively knows the track has no lyric
    /// content. The resolver treats errors as "not instrumental" and moves
    /// on to the next detector.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend cannot answer.
    async fn detect_instrumental(&self, track: &Track) -> Result<bool>;

    /// Fetch lyrics for the track. `Ok(None)` means this source has
    /// nothing; the resolver moves on to the next source.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend request fails.
    async fn fetch(&self, track: &Track) -> Result<Option<LyricsDocument>>;
}
