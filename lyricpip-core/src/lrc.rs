//! LRC lyric text parsing into timed block sequences.

use crate::block::LyricsBlock;

/// Tail duration appended to the final block, which has no successor to end
/// it, in milliseconds.
const LAST_BLOCK_TAIL_MS: u64 = 5000;

/// Minimum block duration in milliseconds; rapid-fire lines are stretched so
/// they stay readable.
const MIN_BLOCK_DURATION_MS: u64 = 2000;

/// Slot duration per line when fabricating timing for plain lyrics.
const PLAIN_LINE_DURATION_MS: u64 = 4000;

/// Parse LRC text into an ordered block sequence.
///
/// Metadata tags (`[ar:..]`, `[offset:..]`, ...) and untimed lines are
/// skipped; a line carrying several timestamps yields one block per
/// timestamp. End times are derived: each block ends where the next starts,
/// the final block gets a fixed tail.
#[must_use]
pub fn parse_lrc(input: &str) -> Vec<LyricsBlock> {
    let mut timed = Vec::new();
    for line in input.lines() {
        let (stamps, text) = split_timestamps(line.trim());
        if text.is_empty() {
            continue;
        }
        for stamp in stamps {
            timed.push((stamp, text.clone()));
        }
    }
    blocks_from_timed(timed)
}

/// Build a block sequence from `(start_ms, text)` pairs with derived end
/// times. Pairs are sorted by start; the resulting starts and ends are both
/// non-decreasing, as the locator requires.
#[must_use]
pub fn blocks_from_timed(mut timed: Vec<(u64, String)>) -> Vec<LyricsBlock> {
    timed.sort_by_key(|(start, _)| *start);
    let mut blocks = Vec::with_capacity(timed.len());
    for (i, (start, text)) in timed.iter().enumerate() {
        let next_start = timed
            .get(i + 1)
            .map_or(start.saturating_add(LAST_BLOCK_TAIL_MS), |(next, _)| *next);
        let end = next_start.max(start.saturating_add(MIN_BLOCK_DURATION_MS));
        blocks.push(LyricsBlock::new(*start, end, text.clone()));
    }
    blocks
}

/// Spread plain (untimed) lyric text over fixed per-line slots.
#[must_use]
pub fn plain_to_blocks(input: &str) -> Vec<LyricsBlock> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(i, line)| {
            let start = i as u64 * PLAIN_LINE_DURATION_MS;
            LyricsBlock::new(start, start + PLAIN_LINE_DURATION_MS, line)
        })
        .collect()
}

/// Split leading `[mm:ss.xx]` timestamps off a line. A bracket tag that is
/// not a timestamp stops the scan, so metadata-only lines come back with no
/// stamps and are dropped by the caller.
fn split_timestamps(line: &str) -> (Vec<u64>, String) {
    let mut stamps = Vec::new();
    let mut rest = line;
    while rest.starts_with('[') {
        let Some(close) = rest.find(']') else {
            break;
        };
        let Some(stamp) = parse_timestamp(&rest[1..close]) else {
            break;
        };
        stamps.push(stamp);
        rest = &rest[close + 1..];
    }
    (stamps, rest.trim().to_string())
}

/// Parse a `mm:ss.xx` timestamp body into milliseconds. Accepts one to
/// three fractional digits and a `:` in place of the `.` separator.
fn parse_timestamp(inner: &str) -> Option<u64> {
    let (minutes, rest) = inner.split_once(':')?;
    let (seconds, frac) = rest.split_once(['.', ':'])?;
    let minutes: u64 = minutes.parse().ok()?;
    let seconds: u64 = seconds.parse().ok()?;
    if frac.is_empty() || frac.len() > 3 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let frac_ms = match frac.len() {
        1 => frac.parse::<u64>().ok()? * 100,
        2 => frac.parse::<u64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };
    Some(minutes * 60_000 + seconds * 1000 + frac_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_lrc() {
        let blocks = parse_lrc("[00:12.34]Hello world");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].start, 12_340);
        assert_eq!(blocks[0].text, "Hello world");
    }

    #[test]
    fn test_parse_derives_end_from_next_start() {
        let blocks = parse_lrc("[00:05.00]First\n[00:10.00]Second");
        assert_eq!(blocks[0].end, 10_000);
    }

    #[test]
    fn test_parse_last_block_gets_tail() {
        let blocks = parse_lrc("[00:05.00]First\n[00:10.00]Last");
        assert_eq!(blocks[1].end, 15_000);
    }

    #[test]
    fn test_parse_enforces_minimum_duration() {
        let blocks = parse_lrc("[00:05.00]Fast\n[00:05.50]Faster\n[00:20.00]Slow");
        assert_eq!(blocks[0].start, 5000);
        assert_eq!(blocks[0].end, 7000);
        // ends stay non-decreasing even when the minimum kicks in
        assert!(blocks[1].end >= blocks[0].end);
    }

    #[test]
    fn test_parse_metadata_tags_skipped() {
        let input = "[ar:Queen]\n[ti:Bohemian Rhapsody]\n[offset:500]\n[00:05.00]Is this the real life";
        let blocks = parse_lrc(input);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "Is this the real life");
    }

    #[test]
    fn test_parse_multi_timestamp_line() {
        let blocks = parse_lrc("[00:05.00][00:15.00]Repeated lyric");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].start, 5000);
        assert_eq!(blocks[1].start, 15_000);
        assert_eq!(blocks[0].text, blocks[1].text);
    }

    #[test]
    fn test_parse_three_digit_fraction() {
        let blocks = parse_lrc("[00:12.345]Precise");
        assert_eq!(blocks[0].start, 12_345);
    }

    #[test]
    fn test_parse_colon_fraction_separator() {
        let blocks = parse_lrc("[00:12:34]Alternative format");
        assert_eq!(blocks[0].start, 12_340);
    }

    #[test]
    fn test_parse_unsorted_input_is_sorted() {
        let blocks = parse_lrc("[00:10.00]Second\n[00:05.00]First");
        assert_eq!(blocks[0].text, "First");
        assert_eq!(blocks[1].text, "Second");
    }

    #[test]
    fn test_parse_empty_and_untimed_lines_ignored() {
        let blocks = parse_lrc("\nJust text\n[00:05.00]Timed\n\n");
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn test_parse_cjk_text() {
        let blocks = parse_lrc("[00:05.00]\u{4f60}\u{597d}\u{4e16}\u{754c}");
        assert_eq!(blocks[0].text, "\u{4f60}\u{597d}\u{4e16}\u{754c}");
    }

    #[test]
    fn test_plain_to_blocks_spacing() {
        let blocks = plain_to_blocks("One\nTwo\n\nThree");
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].start, 0);
        assert_eq!(blocks[0].end, 4000);
        assert_eq!(blocks[1].start, 4000);
        assert_eq!(blocks[2].text, "Three");
    }

    #[test]
    fn test_blocks_from_timed_empty() {
        assert!(blocks_from_timed(Vec::new()).is_empty());
    }
}
