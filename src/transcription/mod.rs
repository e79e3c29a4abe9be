//! Speech-to-text for uploaded audio.

mod whisper;

pub use whisper::WhisperTranscriber;

use crate::chunking::TextSegment;
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Result of transcribing one audio file.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTranscript {
    /// Full transcript text.
    pub text: String,
    /// Timed segments, when the service reports them.
    pub segments: Vec<TextSegment>,
    /// Audio length reported by the service.
    pub duration_seconds: Option<f64>,
}

impl AudioTranscript {
    /// A transcript with text only.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            segments: Vec::new(),
            duration_seconds: None,
        }
    }
}

/// Trait for transcription services.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe an audio file.
    async fn transcribe(&self, audio_path: &Path) -> Result<AudioTranscript>;
}
