//! Persistent per-track timing corrections: a global offset plus
//! timestamp-scoped anchor points.

use crate::error::{CoreError, Result};
use crate::track::Track;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Maximum distance between a query timestamp and an anchor for the anchor
/// to apply, in milliseconds.
pub const ANCHOR_WINDOW_MS: u64 = 30_000;

const CACHE_FORMAT_VERSION: u32 = 1;

/// A timestamp-scoped offset correction, valid near its timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorPoint {
    pub timestamp_ms: u64,
    pub offset_ms: i64,
}

/// Persisted corrections for one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffsetEntry {
    pub global_offset: i64,
    /// Anchor timestamp -> local offset correction; timestamps are unique,
    /// last write wins
    #[serde(default)]
    pub anchor_points: BTreeMap<u64, i64>,
    pub last_updated: DateTime<Utc>,
    /// Denormalized for diagnostics
    pub track_name: String,
    pub artist_name: String,
}

impl OffsetEntry {
    fn new(track: &Track) -> Self {
        Self {
            global_offset: 0,
            anchor_points: BTreeMap::new(),
            last_updated: Utc::now(),
            track_name: track.name.clone(),
            artist_name: track.artist.clone(),
        }
    }

    fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    /// Nearest anchor to `timestamp_ms`; an exact-distance tie resolves
    /// toward the larger timestamp.
    fn nearest_anchor(&self, timestamp_ms: u64) -> Option<AnchorPoint> {
        let below = self.anchor_points.range(..=timestamp_ms).next_back();
        let above = self
            .anchor_points
            .range((Bound::Excluded(timestamp_ms), Bound::Unbounded))
            .next();
        let (timestamp, offset) = match (below, above) {
            (None, None) => return None,
            (Some(anchor), None) | (None, Some(anchor)) => anchor,
            (Some(below), Some(above)) => {
                if above.0 - timestamp_ms <= timestamp_ms - below.0 {
                    above
                } else {
                    below
                }
            }
        };
        Some(AnchorPoint {
            timestamp_ms: *timestamp,
            offset_ms: *offset,
        })
    }
}

/// The persisted cache blob: one entry per normalized track identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffsetCache {
    pub version: u32,
    #[serde(default)]
    pub tracks: HashMap<String, OffsetEntry>,
}

impl Default for OffsetCache {
    fn default() -> Self {
        Self {
            version: CACHE_FORMAT_VERSION,
            tracks: HashMap::new(),
        }
    }
}

/// Write-through store for per-track timing corrections.
///
/// Every mutation updates the in-memory map and flushes the whole cache to
/// disk before returning. A failed flush is logged and surfaced as an error,
/// but the in-memory state stays authoritative for the rest of the session.
pub struct OffsetStore {
    path: PathBuf,
    cache: RwLock<OffsetCache>,
}

impl OffsetStore {
    /// Open the store at `path`, loading any previously persisted cache.
    /// A missing, unreadable or malformed cache file loads as empty.
    pub async fn open(path: PathBuf) -> Self {
        let cache = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<OffsetCache>(&content) {
                Ok(cache) => {
                    info!(
                        "Loaded {} track offset entries from {:?}",
                        cache.tracks.len(),
                        path
                    );
                    cache
                }
                Err(e) => {
                    warn!("Malformed offset cache at {:?}, starting empty: {}", path, e);
                    OffsetCache::default()
                }
            },
            Err(_) => {
                debug!("No offset cache at {:?}, starting empty", path);
                OffsetCache::default()
            }
        };
        Self {
            path,
            cache: RwLock::new(cache),
        }
    }

    /// Persisted global offset for the track, 0 when none is recorded.
    pub async fn global_offset(&self, track: &Track) -> i64 {
        self.cache
            .read()
            .await
            .tracks
            .get(&track.cache_key())
            .map_or(0, |entry| entry.global_offset)
    }

    /// Upsert the track's global offset.
    ///
    /// # Errors
    ///
    /// Returns an error when the flush fails; the in-memory value is kept.
    pub async fn set_global_offset(&self, track: &Track, offset_ms: i64) -> Result<()> {
        let mut cache = self.cache.write().await;
        let entry = cache
            .tracks
            .entry(track.cache_key())
            .or_insert_with(|| OffsetEntry::new(track));
        entry.global_offset = offset_ms;
        entry.touch();
        debug!("Set global offset for {}: {}ms", track.cache_key(), offset_ms);
        self.persist(&cache).await
    }

    /// Reset the track's global offset to 0; no-op when no entry exists.
    ///
    /// # Errors
    ///
    /// Returns an error when the flush fails.
    pub async fn reset_global_offset(&self, track: &Track) -> Result<()> {
        let mut cache = self.cache.write().await;
        let Some(entry) = cache.tracks.get_mut(&track.cache_key()) else {
            return Ok(());
        };
        entry.global_offset = 0;
        entry.touch();
        self.persist(&cache).await
    }

    /// Offset of the nearest anchor within [`ANCHOR_WINDOW_MS`] of
    /// `timestamp_ms`, or `None` when every anchor is farther away.
    pub async fn anchor_offset(&self, track: &Track, timestamp_ms: u64) -> Option<i64> {
        let cache = self.cache.read().await;
        let anchor = cache
            .tracks
            .get(&track.cache_key())?
            .nearest_anchor(timestamp_ms)?;
        (timestamp_ms.abs_diff(anchor.timestamp_ms) <= ANCHOR_WINDOW_MS)
            .then_some(anchor.offset_ms)
    }

    /// Effective correction at `timestamp_ms`: global offset plus the
    /// applicable anchor correction, if any.
    pub async fn effective_offset(&self, track: &Track, timestamp_ms: u64) -> i64 {
        let global = self.global_offset(track).await;
        let anchor = self.anchor_offset(track, timestamp_ms).await.unwrap_or(0);
        global + anchor
    }

    /// Upsert an anchor point, creating the track entry when absent.
    ///
    /// # Errors
    ///
    /// Returns an error when the flush fails.
    pub async fn set_anchor_offset(
        &self,
        track: &Track,
        timestamp_ms: u64,
        offset_ms: i64,
    ) -> Result<()> {
        let mut cache = self.cache.write().await;
        let entry = cache
            .tracks
            .entry(track.cache_key())
            .or_insert_with(|| OffsetEntry::new(track));
        entry.anchor_points.insert(timestamp_ms, offset_ms);
        entry.touch();
        debug!(
            "Set anchor for {} at {}ms: {}ms ({} anchors)",
            track.cache_key(),
            timestamp_ms,
            offset_ms,
            entry.anchor_points.len()
        );
        self.persist(&cache).await
    }

    /// Remove an anchor point; no-op when absent.
    ///
    /// # Errors
    ///
    /// Returns an error when the flush fails.
    pub async fn remove_anchor_offset(&self, track: &Track, timestamp_ms: u64) -> Result<()> {
        let mut cache = self.cache.write().await;
        let removed = cache
            .tracks
            .get_mut(&track.cache_key())
            .is_some_and(|entry| {
                let removed = entry.anchor_points.remove(&timestamp_ms).is_some();
                if removed {
                    entry.touch();
                }
                removed
            });
        if !removed {
            return Ok(());
        }
        self.persist(&cache).await
    }

    /// Drop every correction recorded for the track; no-op when absent.
    ///
    /// # Errors
    ///
    /// Returns an error when the flush fails.
    pub async fn reset_track(&self, track: &Track) -> Result<()> {
        let mut cache = self.cache.write().await;
        if cache.tracks.remove(&track.cache_key()).is_none() {
            return Ok(());
        }
        self.persist(&cache).await
    }

    /// All anchors for the track, ordered by timestamp.
    pub async fn track_anchors(&self, track: &Track) -> Vec<AnchorPoint> {
        self.cache
            .read()
            .await
            .tracks
            .get(&track.cache_key())
            .map_or_else(Vec::new, |entry| {
                entry
                    .anchor_points
                    .iter()
                    .map(|(timestamp, offset)| AnchorPoint {
                        timestamp_ms: *timestamp,
                        offset_ms: *offset,
                    })
                    .collect()
            })
    }

    /// Drop every entry and persist the empty cache.
    ///
    /// # Errors
    ///
    /// Returns an error when the flush fails.
    pub async fn clear(&self) -> Result<()> {
        let mut cache = self.cache.write().await;
        cache.tracks.clear();
        info!("Offset cache cleared");
        self.persist(&cache).await
    }

    /// Snapshot of the full cache blob.
    pub async fn export(&self) -> OffsetCache {
        self.cache.read().await.clone()
    }

    /// Replace the full cache blob and persist it.
    ///
    /// # Errors
    ///
    /// Returns an error when the flush fails.
    pub async fn import(&self, replacement: OffsetCache) -> Result<()> {
        let mut cache = self.cache.write().await;
        *cache = replacement;
        self.persist(&cache).await
    }

    // Flush happens while the caller still holds the write guard, so
    // concurrent mutations serialize and the file always reflects the last
    // write.
    async fn persist(&self, cache: &OffsetCache) -> Result<()> {
        let content = serde_json::to_string_pretty(cache)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| CoreError::OffsetPersist {
                    path: self.path.clone(),
                    source,
                })?;
        }
        tokio::fs::write(&self.path, content).await.map_err(|source| {
            warn!("Failed to persist offset cache to {:?}: {}", self.path, source);
            CoreError::OffsetPersist {
                path: self.path.clone(),
                source,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "lyricpip-offsets-{}-{}.json",
            std::process::id(),
            name
        ))
    }

    fn track() -> Track {
        Track::new("Bohemian Rhapsody", "Queen", 355_000)
    }

    #[tokio::test]
    async fn test_global_offset_roundtrip() {
        let path = temp_path("roundtrip");
        let store = OffsetStore::open(path.clone()).await;
        assert_eq!(store.global_offset(&track()).await, 0);

        store.set_global_offset(&track(), 750).await.unwrap();
        assert_eq!(store.global_offset(&track()).await, 750);

        store.set_global_offset(&track(), -300).await.unwrap();
        assert_eq!(store.global_offset(&track()).await, -300);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_reset_global_offset() {
        let path = temp_path("reset");
        let store = OffsetStore::open(path.clone()).await;

        // absent entry: reset is a no-op and nothing is persisted
        store.reset_global_offset(&track()).await.unwrap();
        assert!(store.export().await.tracks.is_empty());

        store.set_global_offset(&track(), 500).await.unwrap();
        store.reset_global_offset(&track()).await.unwrap();
        assert_eq!(store.global_offset(&track()).await, 0);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_anchor_nearest_within_window() {
        let path = temp_path("anchor-window");
        let store = OffsetStore::open(path.clone()).await;
        store.set_anchor_offset(&track(), 60_000, 200).await.unwrap();
        store.set_anchor_offset(&track(), 120_000, -400).await.unwrap();

        assert_eq!(store.anchor_offset(&track(), 65_000).await, Some(200));
        assert_eq!(store.anchor_offset(&track(), 110_000).await, Some(-400));
        // farther than 30s from every anchor
        assert_eq!(store.anchor_offset(&track(), 200_000).await, None);
        assert_eq!(store.anchor_offset(&track(), 10_000).await, None);
        // exactly at the window edge still applies
        assert_eq!(store.anchor_offset(&track(), 30_000).await, Some(200));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_anchor_tie_prefers_larger_timestamp() {
        let path = temp_path("anchor-tie");
        let store = OffsetStore::open(path.clone()).await;
        store.set_anchor_offset(&track(), 50_000, 111).await.unwrap();
        store.set_anchor_offset(&track(), 70_000, 222).await.unwrap();

        // 60_000 is equidistant; the larger timestamp wins
        assert_eq!(store.anchor_offset(&track(), 60_000).await, Some(222));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_anchor_last_write_wins() {
        let path = temp_path("anchor-upsert");
        let store = OffsetStore::open(path.clone()).await;
        store.set_anchor_offset(&track(), 60_000, 100).await.unwrap();
        store.set_anchor_offset(&track(), 60_000, 900).await.unwrap();

        assert_eq!(store.anchor_offset(&track(), 60_000).await, Some(900));
        assert_eq!(store.track_anchors(&track()).await.len(), 1);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_remove_anchor_idempotent() {
        let path = temp_path("anchor-remove");
        let store = OffsetStore::open(path.clone()).await;
        store.set_anchor_offset(&track(), 60_000, 100).await.unwrap();

        store.remove_anchor_offset(&track(), 60_000).await.unwrap();
        assert_eq!(store.anchor_offset(&track(), 60_000).await, None);
        // removing again (or from an absent entry) is fine
        store.remove_anchor_offset(&track(), 60_000).await.unwrap();

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_effective_offset_sums_global_and_anchor() {
        let path = temp_path("effective");
        let store = OffsetStore::open(path.clone()).await;
        store.set_global_offset(&track(), 500).await.unwrap();
        store.set_anchor_offset(&track(), 60_000, -200).await.unwrap();

        assert_eq!(store.effective_offset(&track(), 60_000).await, 300);
        // out of anchor range: global only
        assert_eq!(store.effective_offset(&track(), 200_000).await, 500);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let path = temp_path("reopen");
        {
            let store = OffsetStore::open(path.clone()).await;
            store.set_global_offset(&track(), 1234).await.unwrap();
            store.set_anchor_offset(&track(), 90_000, -50).await.unwrap();
        }
        let store = OffsetStore::open(path.clone()).await;
        assert_eq!(store.global_offset(&track()).await, 1234);
        assert_eq!(store.anchor_offset(&track(), 90_000).await, Some(-50));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_malformed_cache_loads_empty() {
        let path = temp_path("malformed");
        std::fs::write(&path, "{ not json").unwrap();

        let store = OffsetStore::open(path.clone()).await;
        assert!(store.export().await.tracks.is_empty());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_clear_and_reset_track() {
        let path = temp_path("clear");
        let store = OffsetStore::open(path.clone()).await;
        let other = Track::new("Other", "Artist", 1000);
        store.set_global_offset(&track(), 1).await.unwrap();
        store.set_global_offset(&other, 2).await.unwrap();

        store.reset_track(&track()).await.unwrap();
        assert_eq!(store.global_offset(&track()).await, 0);
        assert_eq!(store.global_offset(&other).await, 2);

        store.clear().await.unwrap();
        assert!(store.export().await.tracks.is_empty());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_export_import_roundtrip() {
        let path_a = temp_path("export");
        let path_b = temp_path("import");
        let store = OffsetStore::open(path_a.clone()).await;
        store.set_global_offset(&track(), 42).await.unwrap();

        let blob = store.export().await;
        let other = OffsetStore::open(path_b.clone()).await;
        other.import(blob).await.unwrap();
        assert_eq!(other.global_offset(&track()).await, 42);

        let _ = std::fs::remove_file(&path_a);
        let _ = std::fs::remove_file(&path_b);
    }

    #[test]
    fn test_entry_tracks_identity_once() {
        // one entry per normalized identity regardless of casing
        let a = Track::new("Song (Live)", "Artist", 1000);
        let b = Track::new("song (live)", "ARTIST", 1000);
        assert_eq!(a.cache_key(), b.cache_key());
    }
}
