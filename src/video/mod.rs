//! YouTube video references and transcripts.

mod ytdlp;

pub use ytdlp::YtDlpTranscriptProvider;

use crate::chunking::TextSegment;
use crate::error::{QuarryError, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// What a user-supplied YouTube link points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoReference {
    Video(String),
    Playlist(String),
}

/// Parse a video URL, short link, embed/shorts URL, playlist URL or raw 11-character id.
pub fn parse_reference(input: &str) -> Result<VideoReference> {
    let input = input.trim();
    let invalid = || QuarryError::Validation(format!("Not a YouTube video URL or id: {}", input));

    if is_video_id(input) {
        return Ok(VideoReference::Video(input.to_string()));
    }

    let with_scheme = if input.contains("://") {
        input.to_string()
    } else {
        format!("https://{}", input)
    };
    let url = Url::parse(&with_scheme).map_err(|_| invalid())?;
    let host = url.host_str().unwrap_or_default().trim_start_matches("www.");
    let query = |key: &str| {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    };
    let mut segments = url.path_segments().into_iter().flatten().filter(|s| !s.is_empty());

    let candidate = match host {
        "youtu.be" => segments.next().map(str::to_string),
        "youtube.com" | "m.youtube.com" | "music.youtube.com" | "youtube-nocookie.com" => {
            match segments.next() {
                Some("watch") => match (query("v"), query("list")) {
                    (Some(v), _) => Some(v),
                    (None, Some(list)) => return Ok(VideoReference::Playlist(list)),
                    (None, None) => None,
                },
                Some("playlist") => return query("list").map(VideoReference::Playlist).ok_or_else(invalid),
                Some("embed" | "shorts" | "v" | "live") => segments.next().map(str::to_string),
                _ => None,
            }
        }
        _ => None,
    };

    candidate
        .filter(|id| is_video_id(id))
        .map(VideoReference::Video)
        .ok_or_else(invalid)
}

/// Resolve the canonical video id, rejecting playlist links.
pub fn resolve_video_id(input: &str) -> Result<String> {
    match parse_reference(input)? {
        VideoReference::Video(id) => Ok(id),
        VideoReference::Playlist(_) => Err(QuarryError::Validation(
            "This is a playlist link. Use the playlist import to add all of its videos.".to_string(),
        )),
    }
}

/// Resolve a playlist id from a playlist URL or a bare id.
pub fn resolve_playlist_id(input: &str) -> Result<String> {
    let input = input.trim();
    let bare = Regex::new(r"^[A-Za-z0-9_-]{12,}$").expect("Invalid regex");
    if bare.is_match(input) {
        return Ok(input.to_string());
    }
    match parse_reference(input)? {
        VideoReference::Playlist(id) => Ok(id),
        // A video opened from a playlist carries the playlist in `list`.
        VideoReference::Video(_) => list_parameter(input).ok_or_else(|| {
            QuarryError::Validation("This is a single video link, not a playlist.".to_string())
        }),
    }
}

fn list_parameter(input: &str) -> Option<String> {
    let with_scheme = if input.contains("://") {
        input.to_string()
    } else {
        format!("https://{}", input)
    };
    let url = Url::parse(&with_scheme).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "list")
        .map(|(_, v)| v.into_owned())
        .filter(|list| !list.is_empty())
}

fn is_video_id(candidate: &str) -> bool {
    candidate.len() == 11
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

/// Watch URL that starts playback at `seconds`.
pub fn timestamped_url(video_id: &str, seconds: f64) -> String {
    format!("{}&t={}s", watch_url(video_id), seconds.max(0.0) as u64)
}

pub fn thumbnail_url(video_id: &str) -> String {
    format!("https://i.ytimg.com/vi/{}/hqdefault.jpg", video_id)
}

/// One caption line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedText {
    pub text: String,
    pub start_ms: u64,
    pub duration_ms: u64,
}

impl From<&TimedText> for TextSegment {
    fn from(line: &TimedText) -> Self {
        TextSegment::new(
            line.text.clone(),
            line.start_ms as f64 / 1000.0,
            line.duration_ms as f64 / 1000.0,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    pub author: Option<String>,
    /// Duration reported by the platform.
    pub duration_seconds: Option<f64>,
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoTranscript {
    pub metadata: VideoMetadata,
    pub lines: Vec<TimedText>,
}

/// Source of video metadata, captions and playlist contents.
#[async_trait]
pub trait TranscriptProvider: Send + Sync {
    /// Fetch metadata and timed captions. Fails with a typed extraction error
    /// when captions are missing or disabled, or the video is private or unavailable.
    async fn fetch_transcript(&self, video_id: &str) -> Result<VideoTranscript>;

    /// Video ids of a playlist, in playlist order.
    async fn list_playlist(&self, playlist_id: &str, limit: usize) -> Result<Vec<String>>;
}
