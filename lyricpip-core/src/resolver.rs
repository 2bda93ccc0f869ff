//! Priority-ordered lyrics resolution chain.

use crate::block::LyricsDocument;
use crate::provider::LyricsSource;
use crate::track::Track;
use tracing::{debug, info, warn};

/// Title keywords that flag a track as likely instrumental when no source
/// has a native signal.
const INSTRUMENTAL_TITLE_KEYWORDS: &[&str] = &[
    "instrumental",
    "karaoke",
    "backing track",
    "without vocals",
    "no vocals",
    "music only",
    "interlude",
];

/// Heuristic title check, usable by sources that have no native
/// instrumental flag.
#[must_use]
pub fn is_likely_instrumental_title(title: &str) -> bool {
    let title = title.to_lowercase();
    INSTRUMENTAL_TITLE_KEYWORDS
        .iter()
        .any(|keyword| title.contains(keyword))
}

/// Resolves lyrics by walking a fixed, construction-ordered source list.
///
/// Order is the quality ranking: the first source returning a non-empty
/// block sequence wins outright, and later sources are never consulted for
/// that track.
pub struct LyricsResolver {
    sources: Vec<Box<dyn LyricsSource>>,
}

impl LyricsResolver {
    #[must_use]
    pub fn new(sources: Vec<Box<dyn LyricsSource>>) -> Self {
        Self { sources }
    }

    /// Names of the registered sources, in priority order.
    #[must_use]
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|source| source.name()).collect()
    }

    /// Resolve lyrics for `track`.
    ///
    /// An affirmative instrumental detection short-circuits the chain with
    /// an empty instrumental document. Otherwise sources are asked in
    /// order, skipping failures and empty results. `None` means every
    /// source was exhausted; "not found" is a state, not an error.
    pub async fn resolve(&self, track: &Track) -> Option<LyricsDocument> {
        info!("Resolving lyrics for: {} - {}", track.artist, track.name);

        if let Some(document) = self.detect_instrumental(track).await {
            return Some(document);
        }

        for source in &self.sources {
            debug!("Trying lyrics source: {}", source.name());
            match source.fetch(track).await {
                Ok(Some(document)) if !document.is_empty() => {
                    info!(
                        "Adopted lyrics from {} ({} blocks)",
                        source.name(),
                        document.blocks.len()
                    );
                    return Some(document);
                }
                Ok(_) => debug!("Source {} had no lyrics", source.name()),
                Err(e) => warn!("Source {} failed: {}", source.name(), e),
            }
        }

        info!(
            "No lyrics found for: {} - {} ({} sources tried)",
            track.artist,
            track.name,
            self.sources.len()
        );
        None
    }

    /// Run the detectors in priority order; detector failures are swallowed
    /// and count as "not instrumental".
    async fn detect_instrumental(&self, track: &Track) -> Option<LyricsDocument> {
        for source in &self.sources {
            match source.detect_instrumental(track).await {
                Ok(true) => {
                    info!(
                        "{} reports {} - {} as instrumental",
                        source.name(),
                        track.artist,
                        track.name
                    );
                    return Some(LyricsDocument::instrumental(Some(source.name().to_string())));
                }
                Ok(false) => {}
                Err(e) => debug!("Instrumental detection via {} failed: {}", source.name(), e),
            }
        }
        None
    }
}
