//! OpenAI Whisper transcription implementation.

use super::{AudioTranscript, Transcriber};
use crate::chunking::TextSegment;
use crate::config::TranscriptionSettings;
use crate::error::{QuarryError, Result};
use crate::openai::create_client;
use async_openai::types::{AudioInput, AudioResponseFormat, CreateTranscriptionRequestArgs};
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, instrument};

/// OpenAI Whisper-based transcriber.
pub struct WhisperTranscriber {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
}

impl WhisperTranscriber {
    pub fn from_settings(settings: &TranscriptionSettings) -> Result<Self> {
        Ok(Self {
            client: create_client(settings.timeout_seconds)?,
            model: settings.model.clone(),
        })
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    #[instrument(skip(self), fields(audio_path = %audio_path.display()))]
    async fn transcribe(&self, audio_path: &Path) -> Result<AudioTranscript> {
        let file_bytes = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.mp3")
            .to_string();

        let request = CreateTranscriptionRequestArgs::default()
            .file(AudioInput::from_vec_u8(file_name, file_bytes))
            .model(&self.model)
            .response_format(AudioResponseFormat::VerboseJson)
            .build()
            .map_err(|e| QuarryError::Transcription(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .audio()
            .transcribe_verbose_json(request)
            .await
            .map_err(|e| QuarryError::Transcription(format!("Whisper API error: {}", e)))?;

        let segments: Vec<TextSegment> = response
            .segments
            .unwrap_or_default()
            .iter()
            .map(|s| {
                TextSegment::new(
                    s.text.trim(),
                    s.start as f64,
                    (s.end - s.start).max(0.0) as f64,
                )
            })
            .filter(|s| !s.text.is_empty())
            .collect();

        debug!("Transcribed {} segments", segments.len());
        Ok(AudioTranscript {
            text: response.text.trim().to_string(),
            segments,
            duration_seconds: Some(response.duration as f64).filter(|d| *d > 0.0),
        })
    }
}
