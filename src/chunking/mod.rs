//! Text chunking for retrieval.
//!
//! Sources arrive as ordered [`TextSegment`]s (timed caption lines for videos,
//! a single zero-offset segment for everything else) and leave as overlapping
//! [`ContentChunk`]s bounded by a character budget.

mod overlap;
mod split;

pub use overlap::OverlapChunker;
pub use split::SentenceSplitter;

use serde::{Deserialize, Serialize};

/// A piece of source text with its position in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSegment {
    /// Text content.
    pub text: String,
    /// Start offset in seconds (0 for non-timed sources).
    pub start_seconds: f64,
    /// Duration in seconds (0 for non-timed sources).
    pub duration_seconds: f64,
}

impl TextSegment {
    /// Create a timed segment.
    pub fn new(text: impl Into<String>, start_seconds: f64, duration_seconds: f64) -> Self {
        Self {
            text: text.into(),
            start_seconds,
            duration_seconds,
        }
    }

    /// A single zero-offset segment holding an entire text.
    pub fn untimed(text: impl Into<String>) -> Self {
        Self::new(text, 0.0, 0.0)
    }

    /// End of this segment in seconds.
    pub fn end_seconds(&self) -> f64 {
        self.start_seconds + self.duration_seconds
    }
}

/// A chunk of source text ready for embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentChunk {
    /// Text content of this chunk.
    pub content: String,
    /// Start offset of the segment that opened this chunk.
    pub start_seconds: f64,
    /// Position of this chunk within its source.
    pub index: u32,
}

impl ContentChunk {
    /// Format the start offset as MM:SS or HH:MM:SS.
    pub fn format_timestamp(&self) -> String {
        format_timestamp(self.start_seconds)
    }
}

/// Configuration for chunking.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters carried from the end of a closed chunk into the next one.
    pub overlap: usize,
    /// Target size of pre-split pieces for oversized segments.
    pub sentence_cap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1200,
            overlap: 200,
            sentence_cap: 500,
        }
    }
}

impl From<&crate::config::ChunkingSettings> for ChunkingConfig {
    fn from(settings: &crate::config::ChunkingSettings) -> Self {
        Self {
            chunk_size: settings.chunk_size,
            overlap: settings.overlap,
            sentence_cap: settings.sentence_cap,
        }
    }
}

/// End time of the last segment, used as a source duration when nothing better is known.
pub fn total_duration(segments: &[TextSegment]) -> f64 {
    segments.last().map(TextSegment::end_seconds).unwrap_or(0.0)
}

/// Format seconds as MM:SS or HH:MM:SS.
pub fn format_timestamp(seconds: f64) -> String {
    let total_seconds = seconds.max(0.0) as u32;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

/// Cut text to at most `max_chars` characters at a word boundary, appending
/// "..." when anything was removed.
pub fn truncate_at_word(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let cut: String = text.chars().take(max_chars).collect();
    let head = match cut.rfind(char::is_whitespace) {
        Some(idx) if idx > 0 => &cut[..idx],
        _ => cut.as_str(),
    };
    format!("{}...", head.trim_end())
}
