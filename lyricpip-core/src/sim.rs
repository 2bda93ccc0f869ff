//! Simulated playback for demos and tests.

use crate::error::Result;
use crate::source::PlaybackProvider;
use crate::track::Track;
use async_trait::async_trait;
use std::time::Instant;

/// A playback provider that loops a fixed sample track against the wall
/// clock. It sits behind [`PlaybackProvider`] like any real backend, so the
/// session cannot tell the difference.
pub struct SimulatedPlayback {
    track: Track,
    started: Instant,
}

impl SimulatedPlayback {
    /// Simulate the built-in sample track.
    #[must_use]
    pub fn new() -> Self {
        Self::with_track(sample_track())
    }

    /// Simulate a caller-provided track.
    #[must_use]
    pub fn with_track(track: Track) -> Self {
        Self {
            track,
            started: Instant::now(),
        }
    }
}

impl Default for SimulatedPlayback {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlaybackProvider for SimulatedPlayback {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn current(&self) -> Result<Option<Track>> {
        let elapsed = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let mut track = self.track.clone();
        track.progress_ms = if track.duration_ms == 0 {
            0
        } else {
            elapsed % track.duration_ms
        };
        track.is_playing = true;
        Ok(Some(track))
    }
}

fn sample_track() -> Track {
    Track::new("Bohemian Rhapsody", "Queen", 355_000)
        .with_id("demo-track-001")
        .with_album("A Night at the Opera")
}
