//! Sync session: the polling coordinator that keeps a lyrics display
//! aligned with externally-driven playback.

use crate::block::{self, BlockPosition, LyricsDocument};
use crate::config::SyncConfig;
use crate::error::{CoreError, Result};
use crate::offsets::{AnchorPoint, OffsetStore};
use crate::resolver::LyricsResolver;
use crate::source::PlaybackProvider;
use crate::track::Track;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No track has been observed yet
    Idle,
    /// A track change is being resolved; the previous lyrics stay visible
    Resolving,
    /// Lyrics are tracking an advancing playback position
    Synced,
    /// The track is loaded but playback is paused
    Paused,
    /// The playback backend is unreachable; the last state stays on display
    Disconnected,
}

/// Events broadcast to session subscribers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A new track identity was observed
    TrackChanged { track: Track },
    /// Resolution finished with a document for the current track
    LyricsResolved { document: LyricsDocument },
    /// Resolution exhausted every source
    LyricsNotFound,
    /// The displayed block position changed
    BlockChanged { position: BlockPosition },
    /// Playback paused or resumed
    PauseChanged { is_paused: bool },
    /// The playback backend could not be reached this tick
    Disconnected { message: String },
    /// The current track's global offset was adjusted
    OffsetAdjusted { global_offset_ms: i64 },
    /// The session was explicitly cleared
    Cleared,
}

/// Read-only projection of the session, rebuilt on demand.
#[derive(Debug, Clone, Serialize)]
pub struct SyncState {
    pub phase: SessionPhase,
    pub track: Option<Track>,
    pub lyrics: Option<LyricsDocument>,
    /// Displayed position, with any manual scroll applied
    pub position: BlockPosition,
    pub global_offset_ms: i64,
    pub is_paused: bool,
    pub user_has_scrolled: bool,
}

#[derive(Debug)]
struct SessionState {
    phase: SessionPhase,
    track: Option<Track>,
    lyrics: Option<LyricsDocument>,
    /// Locator output for the latest effective timestamp
    position: BlockPosition,
    manual_offset: i32,
    user_has_scrolled: bool,
    is_paused: bool,
    /// Consecutive "no track" polls, kept for diagnostics only
    empty_polls: u32,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle,
            track: None,
            lyrics: None,
            position: BlockPosition::BeforeFirst,
            manual_offset: 0,
            user_has_scrolled: false,
            is_paused: false,
            empty_polls: 0,
        }
    }
}

impl SessionState {
    fn block_count(&self) -> usize {
        self.lyrics.as_ref().map_or(0, |doc| doc.blocks.len())
    }

    fn displayed_position(&self) -> BlockPosition {
        block::apply_manual_offset(self.position, self.manual_offset, self.block_count())
    }
}

/// Coordinates playback polling, lyrics resolution, offset correction and
/// block location for one display session.
///
/// One cooperatively scheduled polling task per session: `start` spawns the
/// loop, the cancellation token stops it, and only one tick is ever in
/// flight. Subscribers receive [`SessionEvent`]s over a broadcast channel.
pub struct SyncSession {
    playback: Arc<dyn PlaybackProvider>,
    resolver: LyricsResolver,
    offsets: Arc<OffsetStore>,
    state: RwLock<SessionState>,
    event_tx: broadcast::Sender<SessionEvent>,
    cancel_token: CancellationToken,
    poll_interval: Duration,
    query_timeout: Duration,
    resolve_timeout: Duration,
}

impl SyncSession {
    /// Create a new session around a playback provider, a resolver chain
    /// and an offset store.
    #[must_use]
    pub fn new(
        playback: Arc<dyn PlaybackProvider>,
        resolver: LyricsResolver,
        offsets: Arc<OffsetStore>,
        config: &SyncConfig,
        cancel_token: Option<CancellationToken>,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            playback,
            resolver,
            offsets,
            state: RwLock::new(SessionState::default()),
            event_tx,
            cancel_token: cancel_token.unwrap_or_default(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            query_timeout: Duration::from_millis(config.query_timeout_ms),
            resolve_timeout: Duration::from_millis(config.resolve_timeout_ms),
        })
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Token that stops the polling loop when cancelled.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Start the polling loop in a background task. Cancelling the token
    /// stops further ticks; in-flight work finishes within its own bounds.
    #[must_use]
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        info!(
            "Starting sync session on {} (poll interval {:?})",
            self.playback.name(),
            self.poll_interval
        );
        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!("Sync session shutting down");
                    break;
                }
                () = tokio::time::sleep(self.poll_interval) => {
                    self.tick().await;
                }
            }
        }
    }

    /// One poll cycle. Never faster than the poll interval, even when the
    /// backend is down.
    async fn tick(&self) {
        let polled = match tokio::time::timeout(self.query_timeout, self.playback.current()).await
        {
            Ok(result) => result,
            Err(_) => Err(CoreError::PlaybackUnavailable {
                reason: format!(
                    "{} query exceeded {:?}",
                    self.playback.name(),
                    self.query_timeout
                ),
            }),
        };
        match polled {
            Ok(Some(track)) => self.on_track(track).await,
            Ok(None) => self.on_no_track().await,
            Err(e) => self.on_disconnected(&e).await,
        }
    }

    async fn on_track(&self, track: Track) {
        let changed = {
            let state = self.state.read().await;
            state
                .track
                .as_ref()
                .map_or(true, |current| current.is_different(&track))
        };
        if changed {
            self.on_track_changed(track).await;
        } else {
            self.refresh_progress(track).await;
        }
    }

    async fn on_track_changed(&self, track: Track) {
        info!("Track changed: {} - {}", track.artist, track.name);
        self.state.write().await.phase = SessionPhase::Resolving;
        self.emit(SessionEvent::TrackChanged {
            track: track.clone(),
        });

        // the previous document stays visible while this runs
        let document =
            match tokio::time::timeout(self.resolve_timeout, self.resolver.resolve(&track)).await
            {
                Ok(document) => document,
                Err(_) => {
                    warn!(
                        "Lyrics resolution for {} - {} timed out",
                        track.artist, track.name
                    );
                    None
                }
            };

        let position = match &document {
            Some(doc) => block::locate(&doc.blocks, self.effective_timestamp(&track).await),
            None => BlockPosition::BeforeFirst,
        };

        // single swap: track, document and position become visible together
        let displayed = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            state.is_paused = !track.is_playing;
            state.phase = if track.is_playing {
                SessionPhase::Synced
            } else {
                SessionPhase::Paused
            };
            state.track = Some(track);
            state.lyrics = document.clone();
            state.position = position;
            state.manual_offset = 0;
            state.user_has_scrolled = false;
            state.empty_polls = 0;
            state.displayed_position()
        };

        match document {
            Some(document) => self.emit(SessionEvent::LyricsResolved { document }),
            None => self.emit(SessionEvent::LyricsNotFound),
        }
        self.emit(SessionEvent::BlockChanged {
            position: displayed,
        });
    }

    async fn refresh_progress(&self, track: Track) {
        let adjusted = self.effective_timestamp(&track).await;
        let (pause_change, block_change) = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            let was_paused = state.is_paused;
            let previous = state.displayed_position();
            state.is_paused = !track.is_playing;
            state.phase = if track.is_playing {
                SessionPhase::Synced
            } else {
                SessionPhase::Paused
            };
            state.track = Some(track);
            if let Some(ref lyrics) = state.lyrics {
                state.position = block::locate(&lyrics.blocks, adjusted);
            }
            state.empty_polls = 0;
            let displayed = state.displayed_position();
            (
                (was_paused != state.is_paused).then_some(state.is_paused),
                (displayed != previous).then_some(displayed),
            )
        };
        if let Some(is_paused) = pause_change {
            self.emit(SessionEvent::PauseChanged { is_paused });
        }
        if let Some(position) = block_change {
            self.emit(SessionEvent::BlockChanged { position });
        }
    }

    async fn on_no_track(&self) {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        state.empty_polls += 1;
        if state.track.is_some() {
            // transient absence: keep the last track and lyrics on display
            // to avoid flicker; clear() is the explicit stop
            debug!(
                "No track reported ({} consecutive), retaining last state",
                state.empty_polls
            );
            if state.phase == SessionPhase::Disconnected {
                state.phase = if state.is_paused {
                    SessionPhase::Paused
                } else {
                    SessionPhase::Synced
                };
            }
        } else {
            state.phase = SessionPhase::Idle;
        }
    }

    async fn on_disconnected(&self, error: &CoreError) {
        {
            let mut state = self.state.write().await;
            if state.phase != SessionPhase::Disconnected {
                warn!("Playback query failed, entering disconnected state: {error}");
            }
            // last track and lyrics stay on display while the backend is away
            state.phase = SessionPhase::Disconnected;
        }
        self.emit(SessionEvent::Disconnected {
            message: error.to_string(),
        });
    }

    /// Raw progress plus global offset plus any applicable anchor
    /// correction, re-read from the store on every call. Adjustments become
    /// visible on the next tick with no separate recompute path.
    async fn effective_timestamp(&self, track: &Track) -> i64 {
        let offset = self.offsets.effective_offset(track, track.progress_ms).await;
        i64::try_from(track.progress_ms)
            .unwrap_or(i64::MAX)
            .saturating_add(offset)
    }

    /// Current consolidated view.
    pub async fn state(&self) -> SyncState {
        let state = self.state.read().await;
        let global_offset_ms = match &state.track {
            Some(track) => self.offsets.global_offset(track).await,
            None => 0,
        };
        SyncState {
            phase: state.phase,
            track: state.track.clone(),
            lyrics: state.lyrics.clone(),
            position: state.displayed_position(),
            global_offset_ms,
            is_paused: state.is_paused,
            user_has_scrolled: state.user_has_scrolled,
        }
    }

    /// The latest track snapshot, if any.
    pub async fn current_track(&self) -> Option<Track> {
        self.state.read().await.track.clone()
    }

    /// Resolve lyrics for an arbitrary artist/title pair without touching
    /// session state.
    pub async fn resolve_lyrics(&self, artist: &str, title: &str) -> Option<LyricsDocument> {
        let probe = Track::new(title, artist, 0);
        self.resolver.resolve(&probe).await
    }

    /// Shift the current track's global offset by `delta_ms`, returning the
    /// new offset. No-op returning 0 when no track is active; the change is
    /// picked up on the next tick.
    ///
    /// # Errors
    ///
    /// Returns an error when the offset cache flush fails; the in-memory
    /// offset still applies for the rest of the session.
    pub async fn adjust_offset(&self, delta_ms: i64) -> Result<i64> {
        let Some(track) = self.current_track().await else {
            warn!("No current track for offset adjustment");
            return Ok(0);
        };
        let new_offset = self.offsets.global_offset(&track).await + delta_ms;
        self.offsets.set_global_offset(&track, new_offset).await?;
        self.emit(SessionEvent::OffsetAdjusted {
            global_offset_ms: new_offset,
        });
        Ok(new_offset)
    }

    /// Reset the current track's global offset to 0.
    ///
    /// # Errors
    ///
    /// Returns an error when the offset cache flush fails.
    pub async fn reset_offset(&self) -> Result<i64> {
        let Some(track) = self.current_track().await else {
            return Ok(0);
        };
        self.offsets.reset_global_offset(&track).await?;
        self.emit(SessionEvent::OffsetAdjusted { global_offset_ms: 0 });
        Ok(0)
    }

    /// Record an anchor correction for the current track.
    ///
    /// # Errors
    ///
    /// Returns an error when the offset cache flush fails.
    pub async fn set_anchor_offset(&self, timestamp_ms: u64, offset_ms: i64) -> Result<()> {
        let Some(track) = self.current_track().await else {
            return Ok(());
        };
        self.offsets
            .set_anchor_offset(&track, timestamp_ms, offset_ms)
            .await
    }

    /// Remove an anchor correction from the current track.
    ///
    /// # Errors
    ///
    /// Returns an error when the offset cache flush fails.
    pub async fn remove_anchor_offset(&self, timestamp_ms: u64) -> Result<()> {
        let Some(track) = self.current_track().await else {
            return Ok(());
        };
        self.offsets.remove_anchor_offset(&track, timestamp_ms).await
    }

    /// Drop every correction recorded for the current track.
    ///
    /// # Errors
    ///
    /// Returns an error when the offset cache flush fails.
    pub async fn reset_track_offsets(&self) -> Result<()> {
        let Some(track) = self.current_track().await else {
            return Ok(());
        };
        self.offsets.reset_track(&track).await
    }

    /// All anchors recorded for the current track, ordered by timestamp.
    pub async fn track_anchors(&self) -> Vec<AnchorPoint> {
        let Some(track) = self.current_track().await else {
            return Vec::new();
        };
        self.offsets.track_anchors(&track).await
    }

    /// Effective correction at `timestamp_ms` for the current track.
    pub async fn current_offset(&self, timestamp_ms: u64) -> i64 {
        let Some(track) = self.current_track().await else {
            return 0;
        };
        self.offsets.effective_offset(&track, timestamp_ms).await
    }

    /// Nudge the visible line window by `delta`, one step per discrete
    /// input event; the displayed index never leaves the document.
    pub async fn scroll_by(&self, delta: i32) {
        let position = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            state.manual_offset = state.manual_offset.saturating_add(delta);
            // keep the stored offset inside the clamp range so presses past
            // the edge unwind immediately
            if let BlockPosition::At(index) = state.position {
                let count = state.block_count();
                if count > 0 {
                    let index = i64::try_from(index).unwrap_or(0);
                    let raw = index + i64::from(state.manual_offset);
                    let clamped = raw.clamp(0, i64::try_from(count - 1).unwrap_or(0));
                    state.manual_offset = i32::try_from(clamped - index).unwrap_or(0);
                }
            }
            state.user_has_scrolled = state.manual_offset != 0;
            state.displayed_position()
        };
        self.emit(SessionEvent::BlockChanged { position });
    }

    /// Snap the window back to the synced line.
    pub async fn reset_scroll(&self) {
        let position = {
            let mut state = self.state.write().await;
            state.manual_offset = 0;
            state.user_has_scrolled = false;
            state.displayed_position()
        };
        self.emit(SessionEvent::BlockChanged { position });
    }

    /// Record whether the user is holding the view away from the synced
    /// line.
    pub async fn set_user_scrolled(&self, scrolled: bool) {
        self.state.write().await.user_has_scrolled = scrolled;
    }

    /// Explicit stop: drop the retained track and lyrics and return to
    /// idle. This is the only path that empties the session; transient
    /// "no track" polls never do.
    pub async fn clear(&self) {
        *self.state.write().await = SessionState::default();
        self.emit(SessionEvent::Cleared);
        info!("Session cleared");
    }

    fn emit(&self, event: SessionEvent) {
        // a lagging or absent subscriber is fine; state() always has the
        // consolidated view
        let _ = self.event_tx.send(event);
    }
}
