//! Transcript provider built on yt-dlp.
//!
//! yt-dlp supplies video metadata and the caption track URLs; the json3
//! caption document itself is downloaded with reqwest.

use super::{thumbnail_url, watch_url, TimedText, TranscriptProvider, VideoMetadata, VideoTranscript};
use crate::config::YoutubeSettings;
use crate::error::{ExtractionFailure, QuarryError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// yt-dlp backed [`TranscriptProvider`].
///
/// The HTTP client is created once and shared by every call; it holds no
/// per-request state, so one provider can serve concurrent imports.
pub struct YtDlpTranscriptProvider {
    http: reqwest::Client,
    ytdlp_path: String,
    languages: Vec<String>,
}

impl YtDlpTranscriptProvider {
    pub fn new(settings: &YoutubeSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()?;
        Ok(Self::with_client(http, settings))
    }

    /// Use an existing HTTP client.
    pub fn with_client(http: reqwest::Client, settings: &YoutubeSettings) -> Self {
        Self {
            http,
            ytdlp_path: settings.ytdlp_path.clone(),
            languages: settings.languages.clone(),
        }
    }

    async fn run_ytdlp(&self, args: &[&str]) -> Result<std::process::Output> {
        tokio::process::Command::new(&self.ytdlp_path)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    QuarryError::ToolNotFound(self.ytdlp_path.clone())
                } else {
                    QuarryError::Io(e)
                }
            })
    }

    async fn fetch_info(&self, video_id: &str) -> Result<serde_json::Value> {
        let url = watch_url(video_id);
        let output = self
            .run_ytdlp(&["--dump-json", "--skip-download", "--no-warnings", &url])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(video_id, &stderr));
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

#[async_trait]
impl TranscriptProvider for YtDlpTranscriptProvider {
    #[instrument(skip(self))]
    async fn fetch_transcript(&self, video_id: &str) -> Result<VideoTranscript> {
        let info = self.fetch_info(video_id).await?;
        let metadata = parse_metadata(video_id, &info);

        let track_url = select_caption_track(video_id, &info, &self.languages)?;
        debug!("Downloading captions for {}", video_id);
        let body = self
            .http
            .get(&track_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let lines = parse_json3(&body)?;
        if lines.is_empty() {
            return Err(ExtractionFailure::NoTranscript(video_id.to_string()).into());
        }

        info!("Fetched {} caption lines for {}", lines.len(), video_id);
        Ok(VideoTranscript { metadata, lines })
    }

    #[instrument(skip(self))]
    async fn list_playlist(&self, playlist_id: &str, limit: usize) -> Result<Vec<String>> {
        let url = format!("https://www.youtube.com/playlist?list={}", playlist_id);
        let limit = limit.to_string();
        let output = self
            .run_ytdlp(&[
                "--dump-json",
                "--flat-playlist",
                "--no-warnings",
                "--playlist-end",
                &limit,
                &url,
            ])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(QuarryError::NotFound(format!(
                "playlist {}: {}",
                playlist_id,
                stderr.trim()
            )));
        }

        let ids: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
            .filter_map(|entry| entry["id"].as_str().map(str::to_string))
            .collect();

        info!("Playlist {} lists {} videos", playlist_id, ids.len());
        Ok(ids)
    }
}

/// Turn yt-dlp's error output into the matching extraction failure.
fn classify_failure(video_id: &str, stderr: &str) -> QuarryError {
    let lower = stderr.to_lowercase();
    let id = video_id.to_string();
    let failure = if lower.contains("private video") {
        ExtractionFailure::VideoPrivate(id)
    } else if lower.contains("video unavailable")
        || lower.contains("is not available")
        || lower.contains("has been removed")
        || lower.contains("sign in to confirm your age")
    {
        ExtractionFailure::VideoUnavailable(id)
    } else {
        return QuarryError::Transcription(format!(
            "yt-dlp failed for {}: {}",
            video_id,
            stderr.trim()
        ));
    };
    failure.into()
}

fn parse_metadata(video_id: &str, info: &serde_json::Value) -> VideoMetadata {
    VideoMetadata {
        title: info["title"].as_str().unwrap_or(video_id).to_string(),
        author: info["channel"]
            .as_str()
            .or_else(|| info["uploader"].as_str())
            .map(str::to_string),
        duration_seconds: info["duration"].as_f64(),
        thumbnail_url: Some(
            info["thumbnail"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| thumbnail_url(video_id)),
        ),
    }
}

/// Pick the json3 caption URL, preferring uploaded subtitles over automatic
/// captions and following the language preference order.
fn select_caption_track(
    video_id: &str,
    info: &serde_json::Value,
    languages: &[String],
) -> Result<String> {
    let groups = [&info["subtitles"], &info["automatic_captions"]];

    let has_any = groups
        .iter()
        .any(|g| g.as_object().is_some_and(|tracks| !tracks.is_empty()));
    if !has_any {
        return Err(ExtractionFailure::CaptionsDisabled(video_id.to_string()).into());
    }

    for group in groups {
        let Some(tracks) = group.as_object() else { continue };
        for language in languages {
            let prefix = format!("{}-", language);
            let matching = tracks
                .get(language.as_str())
                .into_iter()
                .chain(
                    tracks
                        .iter()
                        .filter(|(key, _)| key.starts_with(&prefix))
                        .map(|(_, formats)| formats),
                );
            for formats in matching {
                let json3 = formats.as_array().into_iter().flatten().find(|f| f["ext"] == "json3");
                if let Some(url) = json3.and_then(|f| f["url"].as_str()) {
                    return Ok(url.to_string());
                }
            }
        }
    }

    Err(ExtractionFailure::NoTranscript(video_id.to_string()).into())
}

#[derive(Debug, Deserialize)]
struct Json3Document {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Json3Event {
    #[serde(default)]
    t_start_ms: u64,
    #[serde(default)]
    d_duration_ms: u64,
    #[serde(default)]
    segs: Vec<Json3Seg>,
}

#[derive(Debug, Deserialize)]
struct Json3Seg {
    #[serde(default)]
    utf8: String,
}

/// Parse a json3 caption document into caption lines, skipping blank events.
fn parse_json3(body: &str) -> Result<Vec<TimedText>> {
    let document: Json3Document = serde_json::from_str(body)?;

    Ok(document
        .events
        .into_iter()
        .filter_map(|event| {
            let text: String = event.segs.iter().map(|s| s.utf8.as_str()).collect();
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            (!text.is_empty()).then_some(TimedText {
                text,
                start_ms: event.t_start_ms,
                duration_ms: event.d_duration_ms,
            })
        })
        .collect())
}
