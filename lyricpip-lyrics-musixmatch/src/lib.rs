use async_trait::async_trait;
use lyricpip_core::{lrc, CoreError, LyricsDocument, LyricsSource, Track};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

const MACRO_SUBTITLES_URL: &str = "https://apic-desktop.musixmatch.com/ws/1.1/macro.subtitles.get?format=json&subtitle_format=mxm&app_id=web-desktop-app-v1.0";

/// Default timeout for HTTP requests (10 seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Default number of retry attempts
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Musixmatch lyrics source using the desktop-app "usertoken" flow
/// (apic-desktop.musixmatch.com).
///
/// Without a usertoken the source stays registered but yields nothing, so a
/// partially configured chain still resolves through later sources.
pub struct MusixmatchSource {
    client: ClientWithMiddleware,
    usertoken: Option<String>,
}

impl MusixmatchSource {
    /// Create a new Musixmatch source. `usertoken` may be `None` to run the
    /// source in its disabled state.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(usertoken: Option<String>) -> Result<Self, CoreError> {
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

        Ok(Self {
            client,
            usertoken: usertoken.filter(|token| !token.is_empty()),
        })
    }

    /// One `macro.subtitles.get` round trip; the response carries both the
    /// track matcher result and the subtitle payload.
    async fn macro_subtitles(&self, track: &Track, token: &str) -> Result<Value, CoreError> {
        let url = format!(
            "{}&q_artist={}&q_track={}&usertoken={}",
            MACRO_SUBTITLES_URL,
            urlencoding::encode(&track.artist),
            urlencoding::encode(&track.name),
            urlencoding::encode(token)
        );

        let response = self
            .client
            .get(&url)
            .header("Cookie", format!("x-mxm-token-guid={token}"))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CoreError::SourceFailed {
                source_name: "musixmatch".to_string(),
                reason: format!("macro.subtitles.get: {}", response.status()),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl LyricsSource for MusixmatchSource {
    fn name(&self) -> &'static str {
        "musixmatch"
    }

    async fn detect_instrumental(&self, track: &Track) -> Result<bool, CoreError> {
        let Some(token) = self.usertoken.as_deref() else {
            return Ok(false);
        };
        let value = self.macro_subtitles(track, token).await?;
        Ok(matched_track_is_instrumental(&value))
    }

    async fn fetch(&self, track: &Track) -> Result<Option<LyricsDocument>, CoreError> {
        let Some(token) = self.usertoken.as_deref() else {
            debug!("Musixmatch usertoken not configured, skipping");
            return Ok(None);
        };

        info!(
            "Fetching lyrics from Musixmatch for: {} - {}",
            track.artist, track.name
        );
        let value = self.macro_subtitles(track, token).await?;
        let document = document_from_macro(&value);
        if document.is_none() {
            debug!("Musixmatch had no subtitles for {} - {}", track.artist, track.name);
        }
        Ok(document)
    }
}

fn status_code(value: &Value, pointer: &str) -> i64 {
    value.pointer(pointer).and_then(Value::as_i64).unwrap_or(0)
}

/// Whether the matcher resolved the track and flagged it instrumental.
fn matched_track_is_instrumental(value: &Value) -> bool {
    let Some(macro_calls) = value.pointer("/message/body/macro_calls") else {
        return false;
    };
    if status_code(macro_calls, "/matcher.track.get/message/header/status_code") != 200 {
        return false;
    }
    macro_calls
        .pointer("/matcher.track.get/message/body/track/instrumental")
        .and_then(Value::as_i64)
        .unwrap_or(0)
        == 1
}

/// Extract a synced document from a `macro.subtitles.get` response, if the
/// matcher hit and a subtitle body is present.
fn document_from_macro(value: &Value) -> Option<LyricsDocument> {
    let macro_calls = value.pointer("/message/body/macro_calls")?;
    if status_code(macro_calls, "/matcher.track.get/message/header/status_code") != 200 {
        return None;
    }
    if status_code(macro_calls, "/track.subtitles.get/message/header/status_code") != 200 {
        return None;
    }

    let body = macro_calls
        .pointer("/track.subtitles.get/message/body/subtitle_list")
        .and_then(Value::as_array)?
        .first()?
        .pointer("/subtitle/subtitle_body")
        .and_then(Value::as_str)?;

    let blocks = parse_subtitle_body(body);
    if blocks.is_empty() {
        return None;
    }
    Some(LyricsDocument::synced(blocks, "musixmatch").with_confidence(0.9))
}

/// Parse the mxm subtitle body: a JSON array of lines carrying `text` and
/// `time.total` (seconds). Untexted lines are dropped; end times are derived
/// the same way as for LRC input.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_subtitle_body(body: &str) -> Vec<lyricpip_core::LyricsBlock> {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return Vec::new();
    };
    let Some(lines) = value.as_array() else {
        return Vec::new();
    };

    let mut timed = Vec::new();
    for line in lines {
        let text = line
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim();
        if text.is_empty() {
            continue;
        }
        let total = line
            .pointer("/time/total")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        timed.push(((total.max(0.0) * 1000.0).round() as u64, text.to_string()));
    }
    lrc::blocks_from_timed(timed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyricpip_core::LyricsQuality;

    fn macro_response(matcher_status: i64, subtitle_status: i64, body: &str) -> Value {
        serde_json::json!({
            "message": { "body": { "macro_calls": {
                "matcher.track.get": {
                    "message": {
                        "header": { "status_code": matcher_status },
                        "body": { "track": { "instrumental": 0 } }
                    }
                },
                "track.subtitles.get": {
                    "message": {
                        "header": { "status_code": subtitle_status },
                        "body": { "subtitle_list": [
                            { "subtitle": { "subtitle_body": body } }
                        ]}
                    }
                }
            }}}
        })
    }

    const SUBTITLE_BODY: &str = r#"[
        {"text": "First line", "time": {"total": 5.0}},
        {"text": "", "time": {"total": 7.5}},
        {"text": "Second line", "time": {"total": 10.0}}
    ]"#;

    #[test]
    fn test_parse_subtitle_body() {
        let blocks = parse_subtitle_body(SUBTITLE_BODY);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].start, 5000);
        assert_eq!(blocks[0].end, 10_000);
        assert_eq!(blocks[0].text, "First line");
        assert_eq!(blocks[1].start, 10_000);
    }

    #[test]
    fn test_parse_subtitle_body_garbage() {
        assert!(parse_subtitle_body("not json").is_empty());
        assert!(parse_subtitle_body("{}").is_empty());
    }

    #[test]
    fn test_document_from_macro() {
        let value = macro_response(200, 200, SUBTITLE_BODY);
        let document = document_from_macro(&value).unwrap();
        assert_eq!(document.quality, LyricsQuality::Synced);
        assert_eq!(document.source.as_deref(), Some("musixmatch"));
        assert_eq!(document.blocks.len(), 2);
    }

    #[test]
    fn test_document_requires_matcher_hit() {
        assert!(document_from_macro(&macro_response(404, 200, SUBTITLE_BODY)).is_none());
        assert!(document_from_macro(&macro_response(200, 404, SUBTITLE_BODY)).is_none());
        assert!(document_from_macro(&serde_json::json!({})).is_none());
    }

    #[test]
    fn test_instrumental_flag() {
        let mut value = macro_response(200, 200, SUBTITLE_BODY);
        assert!(!matched_track_is_instrumental(&value));

        *value
            .pointer_mut("/message/body/macro_calls/matcher.track.get/message/body/track/instrumental")
            .unwrap() = serde_json::json!(1);
        assert!(matched_track_is_instrumental(&value));
    }

    #[tokio::test]
    async fn test_disabled_without_usertoken() {
        let source = MusixmatchSource::new(None).unwrap();
        let track = Track::new("Song", "Artist", 180_000);
        assert!(source.fetch(&track).await.unwrap().is_none());
        assert!(!source.detect_instrumental(&track).await.unwrap());

        let source = MusixmatchSource::new(Some(String::new())).unwrap();
        assert!(source.fetch(&track).await.unwrap().is_none());
    }
}
