use serde::{Deserialize, Serialize};

/// Snapshot of the currently playing track, as reported by a playback
/// provider.
///
/// A new snapshot supersedes the previous one wholesale on every poll;
/// nothing in here is mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Native track id from the backend, when it has one
    pub id: Option<String>,
    /// Track name
    pub name: String,
    /// Artist name(s)
    pub artist: String,
    /// Album name
    #[serde(default)]
    pub album: String,
    /// Total track length in milliseconds
    pub duration_ms: u64,
    /// Whether playback is currently advancing
    pub is_playing: bool,
    /// Raw playback position in milliseconds
    pub progress_ms: u64,
}

impl Track {
    /// Create a new track snapshot at position zero, playing.
    pub fn new(name: impl Into<String>, artist: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            id: None,
            name: name.into(),
            artist: artist.into(),
            album: String::new(),
            duration_ms,
            is_playing: true,
            progress_ms: 0,
        }
    }

    /// Set the native backend id
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the album name
    #[must_use]
    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = album.into();
        self
    }

    /// Set the playback position
    #[must_use]
    pub const fn at(mut self, progress_ms: u64) -> Self {
        self.progress_ms = progress_ms;
        self
    }

    /// Normalized identity key: lowercase `artist_title` with every
    /// non-alphanumeric character mapped to `_`. Stable across backends, so
    /// persisted offsets survive id changes.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!("{}_{}", self.artist, self.name)
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }

    /// Identity used for change detection: the native id when present,
    /// otherwise the normalized cache key.
    #[must_use]
    pub fn identity(&self) -> String {
        self.id.clone().unwrap_or_else(|| self.cache_key())
    }

    /// Whether `other` refers to a different track than this snapshot.
    #[must_use]
    pub fn is_different(&self, other: &Self) -> bool {
        self.identity() != other.identity()
    }

    /// Track duration in whole seconds (for lyrics source matching).
    #[must_use]
    pub fn duration_secs(&self) -> u32 {
        u32::try_from(self.duration_ms / 1000).unwrap_or(u32::MAX)
    }
}
