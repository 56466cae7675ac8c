use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use parley_common::{Error, Result};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use super::{Tool, ToolContext, ToolOutput, required_str};

pub const YOUTUBE_API_URL: &str = "https://www.googleapis.com/youtube/v3";
pub const TIMEDTEXT_URL: &str = "https://video.google.com/timedtext";

const MAX_TRANSCRIPT_CHARS: usize = 15_000;
const MAX_TAGS: usize = 5;
const LATEST_UPLOADS: usize = 5;
const NOT_CONFIGURED: &str = "YouTube API is not configured.";

static VIDEO_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:youtube\.com/watch\?(?:[^#\s]*&)?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/v/|youtube\.com/shorts/)([A-Za-z0-9_-]{11})",
    )
    .expect("video id regex should compile")
});

static CAPTION_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<text[^>]*>(.*?)</text>").expect("caption regex should compile")
});

static ISO_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$")
        .expect("duration regex should compile")
});

/// Extract the 11-character video id from the common YouTube URL shapes.
pub fn extract_video_id(url: &str) -> Option<&str> {
    VIDEO_ID
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Decode the handful of entities timed-text captions use. `&amp;` goes first
/// because captions are frequently double-encoded (`&amp;#39;`).
pub fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
}

/// Join the caption lines of a timed-text XML document.
pub fn parse_captions(xml: &str) -> String {
    CAPTION_TEXT
        .captures_iter(xml)
        .filter_map(|c| c.get(1))
        .map(|m| decode_entities(m.as_str()).replace('\n', " "))
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render an ISO-8601 duration (`PT1H2M3S`) as `1:02:03`.
fn format_duration(iso: &str) -> String {
    let Some(caps) = ISO_DURATION.captures(iso) else {
        return iso.to_string();
    };
    let part = |i: usize| -> u64 {
        caps.get(i)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };
    let hours = part(1) * 24 + part(2);
    let (minutes, seconds) = (part(3), part(4));
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}... [transcript truncated]", &text[..cut]),
        None => text.to_string(),
    }
}

/// Thin client for the YouTube Data API and the public caption endpoint.
pub struct YouTubeApi {
    client: Client,
    api_key: Option<String>,
    api_base: String,
    timedtext_url: String,
}

impl YouTubeApi {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key,
            api_base: YOUTUBE_API_URL.to_string(),
            timedtext_url: TIMEDTEXT_URL.to_string(),
        }
    }

    pub fn with_base_urls(
        mut self,
        api_base: impl Into<String>,
        timedtext_url: impl Into<String>,
    ) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self.timedtext_url = timedtext_url.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<T> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Tool(NOT_CONFIGURED.into()))?;
        let mut url = Url::parse(&format!("{}/{endpoint}", self.api_base))
            .map_err(|e| Error::Tool(format!("invalid YouTube url: {e}")))?;
        url.query_pairs_mut()
            .extend_pairs(params.iter().copied())
            .append_pair("key", api_key);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Tool(format!("YouTube request failed: {}", e.without_url())))?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Tool(format!("invalid YouTube response: {}", e.without_url())))?;

        if let Some(message) = body["error"]["message"].as_str() {
            return Err(Error::Tool(format!("YouTube API error: {message}")));
        }
        serde_json::from_value(body).map_err(Error::from)
    }

    /// English caption track, if the video has one.
    async fn transcript(&self, video_id: &str) -> Option<String> {
        let url = Url::parse_with_params(&self.timedtext_url, [("lang", "en"), ("v", video_id)]).ok()?;
        let response = match self.client.get(url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!(video_id, status = %r.status(), "no caption track");
                return None;
            }
            Err(e) => {
                debug!(video_id, "caption fetch failed: {}", e.without_url());
                return None;
            }
        };
        let xml = response.text().await.ok()?;
        let transcript = parse_captions(&xml);
        (!transcript.is_empty()).then_some(transcript)
    }
}

#[derive(Debug, Deserialize)]
struct ItemList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Video {
    snippet: VideoSnippet,
    content_details: Option<ContentDetails>,
    statistics: Option<Statistics>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct VideoSnippet {
    title: String,
    channel_title: String,
    published_at: String,
    description: String,
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    #[serde(default)]
    duration: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    view_count: Option<String>,
    like_count: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: SearchId,
    snippet: SearchSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    channel_id: Option<String>,
    video_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SearchSnippet {
    title: String,
    channel_title: String,
    published_at: String,
}

/// Fetch a video's metadata and transcript so the model can summarize it.
pub struct YouTubeSummarizeTool {
    api: Arc<YouTubeApi>,
}

impl YouTubeSummarizeTool {
    pub fn new(api: Arc<YouTubeApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Tool for YouTubeSummarizeTool {
    fn name(&self) -> &'static str {
        "summarize_youtube_video"
    }

    fn description(&self) -> &'static str {
        "Fetch details and the transcript of a YouTube video so it can be summarized. \
         Use when the user shares a YouTube link or asks about a specific video."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "video_url": {
                    "type": "string",
                    "description": "Full YouTube video URL"
                }
            },
            "required": ["video_url"]
        })
    }

    async fn execute(&self, _context: &ToolContext, args: Value) -> Result<ToolOutput> {
        if !self.api.is_configured() {
            return Ok(ToolOutput::error(NOT_CONFIGURED));
        }
        let url = required_str(&args, "video_url")?;
        let Some(video_id) = extract_video_id(url) else {
            return Ok(ToolOutput::error("Invalid YouTube URL."));
        };

        let list: ItemList<Video> = self
            .api
            .get(
                "videos",
                &[("id", video_id), ("part", "snippet,contentDetails,statistics")],
            )
            .await?;
        let Some(video) = list.items.into_iter().next() else {
            return Ok(ToolOutput::error("Video not found."));
        };

        let transcript = self.api.transcript(video_id).await;
        let snippet = &video.snippet;
        let stats = video.statistics.as_ref();
        let tags = if snippet.tags.is_empty() {
            "none".to_string()
        } else {
            snippet.tags.iter().take(MAX_TAGS).cloned().collect::<Vec<_>>().join(", ")
        };

        let mut out = format!(
            "Title: {}\nChannel: {}\nPublished: {}\nViews: {}\nLikes: {}\nDuration: {}\nTags: {}\n\nDescription:\n{}",
            snippet.title,
            snippet.channel_title,
            snippet.published_at,
            stats.and_then(|s| s.view_count.as_deref()).unwrap_or("unknown"),
            stats.and_then(|s| s.like_count.as_deref()).unwrap_or("unknown"),
            video
                .content_details
                .as_ref()
                .map(|d| format_duration(&d.duration))
                .unwrap_or_else(|| "unknown".into()),
            tags,
            snippet.description.trim(),
        );
        match transcript {
            Some(text) => {
                out.push_str("\n\nTranscript:\n");
                out.push_str(&truncate_chars(&text, MAX_TRANSCRIPT_CHARS));
            }
            None => out.push_str(
                "\n\nTranscript: not available. Summarize from the title and description.",
            ),
        }
        Ok(ToolOutput::success(out))
    }
}

/// Resolve a channel by name and list its latest uploads.
pub struct YouTubeChannelSearchTool {
    api: Arc<YouTubeApi>,
}

impl YouTubeChannelSearchTool {
    pub fn new(api: Arc<YouTubeApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Tool for YouTubeChannelSearchTool {
    fn name(&self) -> &'static str {
        "search_youtube_channel"
    }

    fn description(&self) -> &'static str {
        "Find a YouTube channel by name and list its most recent videos with titles, \
         publish dates and links."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "channel_name": {
                    "type": "string",
                    "description": "Name of the YouTube channel"
                }
            },
            "required": ["channel_name"]
        })
    }

    async fn execute(&self, _context: &ToolContext, args: Value) -> Result<ToolOutput> {
        if !self.api.is_configured() {
            return Ok(ToolOutput::error(NOT_CONFIGURED));
        }
        let name = required_str(&args, "channel_name")?;

        let channels: ItemList<SearchResult> = self
            .api
            .get(
                "search",
                &[("part", "snippet"), ("type", "channel"), ("maxResults", "1"), ("q", name)],
            )
            .await?;
        let Some((channel_id, channel_title)) = channels
            .items
            .into_iter()
            .find_map(|r| r.id.channel_id.map(|id| (id, r.snippet.channel_title)))
        else {
            return Ok(ToolOutput::error(format!("No YouTube channel found for '{name}'.")));
        };

        let max = LATEST_UPLOADS.to_string();
        let videos: ItemList<SearchResult> = self
            .api
            .get(
                "search",
                &[
                    ("part", "snippet"),
                    ("channelId", channel_id.as_str()),
                    ("order", "date"),
                    ("type", "video"),
                    ("maxResults", max.as_str()),
                ],
            )
            .await?;

        let lines: Vec<String> = videos
            .items
            .iter()
            .filter_map(|r| {
                let id = r.id.video_id.as_deref()?;
                Some(format!(
                    "- {} ({})\n  https://www.youtube.com/watch?v={id}",
                    r.snippet.title, r.snippet.published_at
                ))
            })
            .collect();

        let title = if channel_title.is_empty() { name } else { channel_title.as_str() };
        if lines.is_empty() {
            return Ok(ToolOutput::success(format!("Channel '{title}' has no public videos.")));
        }
        Ok(ToolOutput::success(format!(
            "Latest videos from {title}:\n{}",
            lines.join("\n")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_ids_from_known_url_shapes() {
        let id = "dQw4w9WgXcQ";
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtube.com/watch?feature=share&v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ?t=42",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/v/dQw4w9WgXcQ",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
        ] {
            assert_eq!(extract_video_id(url), Some(id), "{url}");
        }
        assert_eq!(extract_video_id("https://example.com/watch?v=dQw4w9WgXcQ"), None);
        assert_eq!(extract_video_id("https://youtu.be/short"), None);
    }

    #[test]
    fn captions_are_joined_and_decoded() {
        let xml = r#"<?xml version="1.0" encoding="utf-8" ?><transcript>
            <text start="0" dur="1.5">Rock &amp; roll</text>
            <text start="1.5" dur="2">it&amp;#39;s &lt;fine&gt;</text>
            <text start="3.5" dur="1"></text>
            <text start="4.5" dur="1">&quot;done&quot;</text>
        </transcript>"#;
        assert_eq!(parse_captions(xml), r#"Rock & roll it's <fine> "done""#);
    }

    #[test]
    fn durations_render_as_clock_time() {
        assert_eq!(format_duration("PT4M13S"), "4:13");
        assert_eq!(format_duration("PT1H2M3S"), "1:02:03");
        assert_eq!(format_duration("P1DT1H"), "25:00:00");
        assert_eq!(format_duration("garbage"), "garbage");
    }

    #[test]
    fn transcript_truncation_respects_char_boundaries() {
        let text = "é".repeat(10);
        assert_eq!(truncate_chars(&text, 20), text);
        assert!(truncate_chars(&text, 4).starts_with("éééé..."));
    }

    #[tokio::test]
    async fn missing_key_reports_not_configured() {
        let api = Arc::new(YouTubeApi::new(Client::new(), None));
        let ctx = ToolContext::default();
        let summarize = YouTubeSummarizeTool::new(Arc::clone(&api))
            .execute(&ctx, json!({"video_url": "https://youtu.be/dQw4w9WgXcQ"}))
            .await
            .expect("not an Err");
        assert_eq!(summarize.content, NOT_CONFIGURED);

        let search = YouTubeChannelSearchTool::new(api)
            .execute(&ctx, json!({"channel_name": "rust"}))
            .await
            .expect("not an Err");
        assert_eq!(search.content, NOT_CONFIGURED);
    }

    #[tokio::test]
    async fn bad_url_is_reported_to_the_model() {
        let api = Arc::new(YouTubeApi::new(Client::new(), Some("key".into())));
        let output = YouTubeSummarizeTool::new(api)
            .execute(&ToolContext::default(), json!({"video_url": "not a link"}))
            .await
            .expect("not an Err");
        assert_eq!(output, ToolOutput::error("Invalid YouTube URL."));
    }
}
