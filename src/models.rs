//! Domain records shared by the store, ingestion and chat layers.

use crate::chunking::format_timestamp;
use crate::error::QuarryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// What kind of item a source was imported from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Video,
    Text,
    Document,
    Audio,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Video => "video",
            SourceKind::Text => "text",
            SourceKind::Document => "document",
            SourceKind::Audio => "audio",
        }
    }

    /// How the kind is described to the model in a context block.
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Video => "Video",
            SourceKind::Text => "Article",
            SourceKind::Document => "Document",
            SourceKind::Audio => "Audio",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = QuarryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(SourceKind::Video),
            "text" => Ok(SourceKind::Text),
            "document" => Ok(SourceKind::Document),
            "audio" => Ok(SourceKind::Audio),
            other => Err(QuarryError::Validation(format!("Unknown source kind '{}'", other))),
        }
    }
}

/// An imported unit of knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub kind: SourceKind,
    pub title: String,
    /// Raw text, kept for text sources.
    pub content: Option<String>,
    pub url: Option<String>,
    /// Platform identifier (e.g. a YouTube video id). Unique across the store.
    pub external_id: Option<String>,
    /// Original file name of an uploaded document or audio file.
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub thumbnail_url: Option<String>,
    pub duration_seconds: Option<f64>,
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Source {
    pub fn new(kind: SourceKind, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            title: title.into(),
            content: None,
            url: None,
            external_id: None,
            file_name: None,
            mime_type: None,
            thumbnail_url: None,
            duration_seconds: None,
            author: None,
            created_at: Utc::now(),
        }
    }
}

/// A source with its chunk count, for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSummary {
    #[serde(flatten)]
    pub source: Source,
    pub chunk_count: u32,
}

/// Editable source fields. `None` leaves a field unchanged; an empty author clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcePatch {
    pub title: Option<String>,
    pub author: Option<String>,
}

/// An embedded slice of a source's text.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: Uuid,
    pub source_id: Uuid,
    pub content: String,
    pub embedding: Vec<f32>,
    /// Offset into the source in seconds, 0 for untimed sources.
    pub start_seconds: f64,
    pub chunk_index: u32,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    pub fn new(
        source_id: Uuid,
        content: String,
        embedding: Vec<f32>,
        start_seconds: f64,
        chunk_index: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id,
            content,
            embedding,
            start_seconds,
            chunk_index,
            created_at: Utc::now(),
        }
    }
}

/// A chunk without its embedding, for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPreview {
    pub id: Uuid,
    pub chunk_index: u32,
    pub start_seconds: f64,
    pub content: String,
}

impl ChunkPreview {
    pub fn format_timestamp(&self) -> String {
        format_timestamp(self.start_seconds)
    }
}

/// A retrieved chunk joined with its owning source.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk_id: Uuid,
    pub content: String,
    pub start_seconds: f64,
    pub chunk_index: u32,
    /// Cosine similarity to the query (higher is better).
    pub score: f32,
    pub source: Source,
}

impl SearchHit {
    pub fn format_timestamp(&self) -> String {
        format_timestamp(self.start_seconds)
    }
}

/// Who authored a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

impl FromStr for TurnRole {
    type Err = QuarryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(TurnRole::User),
            "assistant" => Ok(TurnRole::Assistant),
            other => Err(QuarryError::Validation(format!("Unknown turn role '{}'", other))),
        }
    }
}

/// A reference back to the chunk that informed an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub source_id: Uuid,
    pub kind: SourceKind,
    pub title: String,
    pub author: Option<String>,
    /// Display timestamp, only for timed sources.
    pub timestamp: Option<String>,
    pub start_seconds: f64,
    pub snippet: String,
    pub score: f32,
    pub url: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>, citations: Vec<Citation>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            citations,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            citations: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// A persisted chat session owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    /// Overrides the user's and the library's default system prompt.
    pub system_prompt: Option<String>,
    pub turns: Vec<Turn>,
    /// Sources that contributed retrieved context, in first-use order.
    pub context_sources: Vec<Uuid>,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Conversation listing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub title: String,
    pub turn_count: u32,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Per-user generation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub user_id: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub default_system_prompt: Option<String>,
}

/// Partial preference update. An empty `default_system_prompt` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreferencesPatch {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub default_system_prompt: Option<String>,
}

impl UserPreferences {
    /// Apply a patch, rejecting values no model accepts.
    pub fn apply(&mut self, patch: PreferencesPatch) -> crate::error::Result<()> {
        let mut next = self.clone();
        if let Some(temperature) = patch.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(QuarryError::Validation(format!(
                    "temperature must be between 0.0 and 2.0, got {}",
                    temperature
                )));
            }
            next.temperature = temperature;
        }
        if let Some(max_tokens) = patch.max_tokens {
            if max_tokens == 0 {
                return Err(QuarryError::Validation("max_tokens must be positive".to_string()));
            }
            next.max_tokens = max_tokens;
        }
        if let Some(model) = patch.model {
            if model.trim().is_empty() {
                return Err(QuarryError::Validation("model must not be empty".to_string()));
            }
            next.model = model.trim().to_string();
        }
        if let Some(prompt) = patch.default_system_prompt {
            let prompt = prompt.trim();
            next.default_system_prompt = (!prompt.is_empty()).then(|| prompt.to_string());
        }
        *self = next;
        Ok(())
    }
}
