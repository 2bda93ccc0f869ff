//! Timed lyric blocks and the pure block-locate algorithm.

use serde::{Deserialize, Serialize};

/// A single timed lyric line covering the half-open interval
/// `[start, end)`, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LyricsBlock {
    pub start: u64,
    pub end: u64,
    pub text: String,
}

impl LyricsBlock {
    pub fn new(start: u64, end: u64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// Quality classification for a resolved lyrics document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LyricsQuality {
    Synced,
    Unsynced,
    Instrumental,
    Unknown,
}

/// A resolved set of lyrics for one track.
///
/// Created once per resolved track and replaced wholesale on track change,
/// never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricsDocument {
    pub blocks: Vec<LyricsBlock>,
    pub quality: LyricsQuality,
    /// Name of the source the document came from
    pub source: Option<String>,
    pub confidence: Option<f32>,
}

impl LyricsDocument {
    /// Time-synced lyrics from a named source.
    #[must_use]
    pub fn synced(blocks: Vec<LyricsBlock>, source: impl Into<String>) -> Self {
        Self {
            blocks,
            quality: LyricsQuality::Synced,
            source: Some(source.into()),
            confidence: None,
        }
    }

    /// Lyrics with fabricated timing (plain text spread over fixed slots).
    #[must_use]
    pub fn unsynced(blocks: Vec<LyricsBlock>, source: impl Into<String>) -> Self {
        Self {
            blocks,
            quality: LyricsQuality::Unsynced,
            source: Some(source.into()),
            confidence: None,
        }
    }

    /// An empty document for a track with no lyric content.
    #[must_use]
    pub fn instrumental(source: Option<String>) -> Self {
        Self {
            blocks: Vec::new(),
            quality: LyricsQuality::Instrumental,
            source,
            confidence: None,
        }
    }

    /// Attach a confidence score.
    #[must_use]
    pub const fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    #[must_use]
    pub const fn is_instrumental(&self) -> bool {
        matches!(self.quality, LyricsQuality::Instrumental)
    }
}

/// Where a timestamp falls within a block sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum BlockPosition {
    /// The timestamp precedes the first block's start. The caller decides
    /// whether to pre-display the first line or show a waiting state.
    BeforeFirst,
    /// The block at this index is current.
    At(usize),
}

impl BlockPosition {
    /// The active block index, if any.
    #[must_use]
    pub const fn index(self) -> Option<usize> {
        match self {
            Self::At(index) => Some(index),
            Self::BeforeFirst => None,
        }
    }
}

/// Locate the block covering `timestamp_ms` within an ordered sequence.
///
/// Blocks must be non-decreasing in both `start` and `end`; gaps and
/// overlaps are tolerated. A timestamp inside a block maps to that block
/// (the first containing index wins on overlapping boundaries); a timestamp
/// in a gap or past the last block holds the last block whose `start` is at
/// or before it; anything before the first block's start (including
/// negative adjusted timestamps) is [`BlockPosition::BeforeFirst`].
#[must_use]
pub fn locate(blocks: &[LyricsBlock], timestamp_ms: i64) -> BlockPosition {
    // index of the first block starting beyond the timestamp; everything
    // before it has start <= t
    let upper = blocks.partition_point(|b| to_i64(b.start) <= timestamp_ms);
    if upper == 0 {
        return BlockPosition::BeforeFirst;
    }
    // earliest block whose interval is still open at t; ends are
    // non-decreasing, so this is the first containing candidate
    let first_open = blocks.partition_point(|b| to_i64(b.end) <= timestamp_ms);
    if first_open < upper {
        BlockPosition::At(first_open)
    } else {
        // gap or past the end: hold the previous line
        BlockPosition::At(upper - 1)
    }
}

/// Apply a manual scroll offset to a located position, clamped so the
/// displayed index never leaves the document. [`BlockPosition::BeforeFirst`]
/// has no window to move and passes through unchanged.
#[must_use]
pub fn apply_manual_offset(
    position: BlockPosition,
    manual_offset: i32,
    block_count: usize,
) -> BlockPosition {
    let BlockPosition::At(index) = position else {
        return position;
    };
    if block_count == 0 {
        return position;
    }
    let raw = to_i64_usize(index) + i64::from(manual_offset);
    let clamped = raw.clamp(0, to_i64_usize(block_count - 1));
    BlockPosition::At(usize::try_from(clamped).unwrap_or(0))
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_i64_usize(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_blocks() -> Vec<LyricsBlock> {
        vec![
            LyricsBlock::new(0, 1000, "A"),
            LyricsBlock::new(1000, 2000, "B"),
            LyricsBlock::new(2000, 3000, "C"),
        ]
    }

    #[test]
    fn test_locate_inside_block() {
        assert_eq!(locate(&three_blocks(), 1500), BlockPosition::At(1));
    }

    #[test]
    fn test_locate_with_global_offset_applied() {
        // progress 1500 + offset 500 = 2000 lands on "C"
        assert_eq!(locate(&three_blocks(), 2000), BlockPosition::At(2));
    }

    #[test]
    fn test_locate_before_first() {
        let blocks = vec![
            LyricsBlock::new(500, 1000, "A"),
            LyricsBlock::new(1000, 2000, "B"),
        ];
        assert_eq!(locate(&blocks, 200), BlockPosition::BeforeFirst);
    }

    #[test]
    fn test_locate_negative_adjusted_timestamp() {
        assert_eq!(locate(&three_blocks(), -200), BlockPosition::BeforeFirst);
    }

    #[test]
    fn test_locate_start_boundary_is_inclusive() {
        assert_eq!(locate(&three_blocks(), 0), BlockPosition::At(0));
        assert_eq!(locate(&three_blocks(), 1000), BlockPosition::At(1));
    }

    #[test]
    fn test_locate_end_boundary_is_exclusive() {
        assert_eq!(locate(&three_blocks(), 999), BlockPosition::At(0));
        assert_eq!(locate(&three_blocks(), 2999), BlockPosition::At(2));
    }

    #[test]
    fn test_locate_holds_through_gap() {
        let blocks = vec![
            LyricsBlock::new(0, 1000, "A"),
            LyricsBlock::new(5000, 6000, "B"),
        ];
        assert_eq!(locate(&blocks, 3000), BlockPosition::At(0));
    }

    #[test]
    fn test_locate_holds_past_last_block() {
        assert_eq!(locate(&three_blocks(), 10_000), BlockPosition::At(2));
    }

    #[test]
    fn test_locate_empty_sequence() {
        assert_eq!(locate(&[], 1234), BlockPosition::BeforeFirst);
    }

    #[test]
    fn test_locate_duplicate_boundaries_first_match_wins() {
        let blocks = vec![
            LyricsBlock::new(1000, 2000, "A"),
            LyricsBlock::new(1000, 2000, "B"),
        ];
        assert_eq!(locate(&blocks, 1000), BlockPosition::At(0));
        assert_eq!(locate(&blocks, 1999), BlockPosition::At(0));
    }

    #[test]
    fn test_locate_monotonically_non_decreasing() {
        let blocks = vec![
            LyricsBlock::new(100, 900, "A"),
            LyricsBlock::new(1000, 2000, "B"),
            LyricsBlock::new(2000, 2500, "C"),
            LyricsBlock::new(4000, 5000, "D"),
        ];
        let mut last = -1_i64;
        for t in (-500..6000).step_by(50) {
            let index = match locate(&blocks, t) {
                BlockPosition::BeforeFirst => -1,
                BlockPosition::At(i) => i64::try_from(i).unwrap(),
            };
            assert!(
                index >= last,
                "position went backwards at t={t}: {last} -> {index}"
            );
            last = index;
        }
    }

    #[test]
    fn test_manual_offset_applies() {
        let position = apply_manual_offset(BlockPosition::At(1), 1, 3);
        assert_eq!(position, BlockPosition::At(2));
    }

    #[test]
    fn test_manual_offset_clamps_at_document_edges() {
        assert_eq!(
            apply_manual_offset(BlockPosition::At(1), -5, 3),
            BlockPosition::At(0)
        );
        assert_eq!(
            apply_manual_offset(BlockPosition::At(1), 10, 3),
            BlockPosition::At(2)
        );
    }

    #[test]
    fn test_manual_offset_ignores_before_first() {
        assert_eq!(
            apply_manual_offset(BlockPosition::BeforeFirst, 2, 3),
            BlockPosition::BeforeFirst
        );
    }

    #[test]
    fn test_manual_offset_empty_document() {
        assert_eq!(
            apply_manual_offset(BlockPosition::At(0), 1, 0),
            BlockPosition::At(0)
        );
    }

    #[test]
    fn test_document_constructors() {
        let doc = LyricsDocument::synced(three_blocks(), "lrclib").with_confidence(0.95);
        assert_eq!(doc.quality, LyricsQuality::Synced);
        assert_eq!(doc.source.as_deref(), Some("lrclib"));
        assert_eq!(doc.confidence, Some(0.95));
        assert!(!doc.is_empty());

        let instrumental = LyricsDocument::instrumental(Some("lrclib".to_string()));
        assert!(instrumental.is_empty());
        assert!(instrumental.is_instrumental());
    }
}
