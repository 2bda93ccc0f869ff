use async_trait::async_trait;
use lyricpip_core::{
    is_likely_instrumental_title, lrc, CoreError, LyricsDocument, LyricsSource, Track,
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const LRCLIB_API_URL: &str = "https://lrclib.net/api";

/// Default timeout for HTTP requests (10 seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Default number of retry attempts
const DEFAULT_MAX_RETRIES: u32 = 3;
/// Duration tolerance when matching search results (±2 seconds)
const DURATION_TOLERANCE_SECS: f64 = 2.0;

/// LRCLIB.net lyrics source
pub struct LrclibSource {
    client: ClientWithMiddleware,
}

impl LrclibSource {
    /// Create a new LRCLIB source with a 10-second timeout and 3 retries.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self, CoreError> {
        let base_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .user_agent("lyricpip/0.1 (https://github.com/lyricpip/lyricpip)")
            .build()?;

        let retry_policy =
            ExponentialBackoff::builder().build_with_max_retries(DEFAULT_MAX_RETRIES);
        let client = ClientBuilder::new(base_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self { client })
    }

    /// Exact lookup via the `/get` endpoint. `Ok(None)` on 404.
    async fn get_exact(&self, track: &Track) -> Result<Option<LrclibResponse>, CoreError> {
        let mut url = format!(
            "{}/get?artist_name={}&track_name={}",
            LRCLIB_API_URL,
            urlencoding::encode(&track.artist),
            urlencoding::encode(&track.name)
        );
        if !track.album.is_empty() {
            use std::fmt::Write;
            let _ = write!(url, "&album_name={}", urlencoding::encode(&track.album));
        }
        if track.duration_ms > 0 {
            use std::fmt::Write;
            let _ = write!(url, "&duration={}", track.duration_secs());
        }

        debug!("LRCLIB GET (exact match): {}", url);
        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(CoreError::SourceFailed {
                source_name: "lrclib".to_string(),
                reason: format!("LRCLIB returned status: {}", response.status()),
            });
        }

        Ok(Some(response.json().await?))
    }

    /// Search fallback: query by artist + track, filter by duration
    /// tolerance, prefer synced results.
    async fn search(&self, track: &Track) -> Result<Option<LrclibResponse>, CoreError> {
        let query = format!("{} {}", track.artist, track.name);
        let url = format!(
            "{}/search?q={}",
            LRCLIB_API_URL,
            urlencoding::encode(&query)
        );

        debug!("LRCLIB GET (search): {}", url);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(CoreError::SourceFailed {
                source_name: "lrclib".to_string(),
                reason: format!("LRCLIB search returned status: {}", response.status()),
            });
        }

        let results: Vec<LrclibResponse> = response.json().await?;
        let query_duration = (track.duration_ms > 0).then(|| f64::from(track.duration_secs()));

        let best = results
            .into_iter()
            .filter(|r| r.synced_lyrics.is_some() || r.plain_lyrics.is_some())
            .filter(|r| match (r.duration, query_duration) {
                (Some(d), Some(q)) => (d - q).abs() <= DURATION_TOLERANCE_SECS,
                _ => true,
            })
            .min_by_key(|r| {
                // prefer synced, then the closest duration
                let sync_score = if r.synced_lyrics.is_some() { 0 } else { 100 };
                sync_score + duration_score(r.duration, query_duration)
            });

        Ok(best)
    }
}

/// Score for duration matching (lower is better); 0 for exact matches.
#[allow(clippy::cast_possible_truncation)]
fn duration_score(actual: Option<f64>, expected: Option<f64>) -> i32 {
    match (actual, expected) {
        (Some(d), Some(q)) => {
            let diff = (d - q).abs() * 10.0;
            diff.min(f64::from(i32::MAX)) as i32
        }
        _ => 50, // unknown duration scores behind any close match
    }
}

/// Response from the LRCLIB API. The API returns more fields (trackName,
/// albumName) that go unused here; serde ignores unknown fields by default.
#[derive(Debug, Deserialize)]
struct LrclibResponse {
    id: i64,
    duration: Option<f64>,
    instrumental: bool,
    #[serde(rename = "plainLyrics")]
    plain_lyrics: Option<String>,
    #[serde(rename = "syncedLyrics")]
    synced_lyrics: Option<String>,
}

/// Convert an API response into a document. Instrumental and lyric-less
/// responses map to `None`; the resolver's detector path handles the former.
fn document_from(result: &LrclibResponse) -> Option<LyricsDocument> {
    if result.instrumental {
        debug!("Track is instrumental (lrclib id: {})", result.id);
        return None;
    }

    if let Some(synced) = result.synced_lyrics.as_deref() {
        let blocks = lrc::parse_lrc(synced);
        if !blocks.is_empty() {
            debug!(
                "Got synced lyrics with {} blocks (lrclib id: {})",
                blocks.len(),
                result.id
            );
            return Some(LyricsDocument::synced(blocks, "lrclib").with_confidence(0.95));
        }
    }

    if let Some(plain) = result.plain_lyrics.as_deref() {
        let blocks = lrc::plain_to_blocks(plain);
        if !blocks.is_empty() {
            debug!("Got plain lyrics (lrclib id: {})", result.id);
            return Some(LyricsDocument::unsynced(blocks, "lrclib").with_confidence(0.7));
        }
    }

    None
}

#[async_trait]
impl LyricsSource for LrclibSource {
    fn name(&self) -> &'static str {
        "lrclib"
    }

    async fn detect_instrumental(&self, track: &Track) -> Result<bool, CoreError> {
        match self.get_exact(track).await {
            Ok(Some(result)) => Ok(result.instrumental),
            // no exact record: fall back to the title heuristic
            Ok(None) => Ok(is_likely_instrumental_title(&track.name)),
            Err(e) => Err(e),
        }
    }

    async fn fetch(&self, track: &Track) -> Result<Option<LyricsDocument>, CoreError> {
        info!(
            "Fetching lyrics from LRCLIB for: {} - {} (duration: {}s)",
            track.artist,
            track.name,
            track.duration_secs()
        );

        if let Some(result) = self.get_exact(track).await? {
            if let Some(document) = document_from(&result) {
                return Ok(Some(document));
            }
            if result.instrumental {
                // nothing to fetch, and searching would only find covers
                return Ok(None);
            }
        }

        debug!("LRCLIB exact match had no lyrics, trying search");
        match self.search(track).await {
            Ok(Some(result)) => Ok(document_from(&result)),
            Ok(None) => {
                info!("LRCLIB has no lyrics for {} - {}", track.artist, track.name);
                Ok(None)
            }
            Err(e) => {
                warn!("LRCLIB search failed: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyricpip_core::LyricsQuality;

    fn response(
        synced: Option<&str>,
        plain: Option<&str>,
        instrumental: bool,
    ) -> LrclibResponse {
        LrclibResponse {
            id: 1,
            duration: Some(180.0),
            instrumental,
            plain_lyrics: plain.map(String::from),
            synced_lyrics: synced.map(String::from),
        }
    }

    #[test]
    fn test_document_prefers_synced() {
        let result = response(
            Some("[00:05.00]First\n[00:10.00]Second"),
            Some("First\nSecond"),
            false,
        );
        let document = document_from(&result).unwrap();
        assert_eq!(document.quality, LyricsQuality::Synced);
        assert_eq!(document.blocks.len(), 2);
        assert_eq!(document.source.as_deref(), Some("lrclib"));
    }

    #[test]
    fn test_document_falls_back_to_plain() {
        let result = response(None, Some("First\nSecond"), false);
        let document = document_from(&result).unwrap();
        assert_eq!(document.quality, LyricsQuality::Unsynced);
        assert_eq!(document.blocks.len(), 2);
    }

    #[test]
    fn test_document_instrumental_is_none() {
        let result = response(Some("[00:05.00]x"), None, true);
        assert!(document_from(&result).is_none());
    }

    #[test]
    fn test_document_empty_is_none() {
        let result = response(None, None, false);
        assert!(document_from(&result).is_none());
        // synced field present but unparseable as LRC
        let result = response(Some("no timestamps here"), None, false);
        assert!(document_from(&result).is_none());
    }

    #[test]
    fn test_duration_score() {
        assert_eq!(duration_score(Some(180.0), Some(180.0)), 0);
        assert!(duration_score(Some(185.0), Some(180.0)) > 0);
        assert_eq!(duration_score(None, Some(180.0)), 50);
        assert_eq!(duration_score(Some(180.0), None), 50);
    }
}
