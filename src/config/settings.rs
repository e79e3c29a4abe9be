//! Configuration settings for Quarry.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub store: StoreSettings,
    pub embedding: EmbeddingSettings,
    pub chunking: ChunkingSettings,
    pub retrieval: RetrievalSettings,
    pub generation: GenerationSettings,
    pub transcription: TranscriptionSettings,
    pub youtube: YoutubeSettings,
    pub ingest: IngestSettings,
    pub server: ServerSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Directory for temporary upload files.
    pub temp_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.quarry".to_string(),
            temp_dir: "/tmp/quarry".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Knowledge store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Path to the SQLite database.
    pub sqlite_path: String,
    /// Name of the vector index over chunk embeddings.
    pub vector_index: String,
    /// Provision the vector index automatically when the store is opened.
    pub auto_create_index: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            sqlite_path: "~/.quarry/knowledge.db".to_string(),
            vector_index: "chunk_embedding_index".to_string(),
            auto_create_index: true,
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding model to use.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
    /// Maximum texts per embedding request.
    pub batch_size: usize,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            batch_size: 100,
            timeout_seconds: 60,
        }
    }
}

/// Text chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters carried from the end of one chunk into the next.
    pub overlap: usize,
    /// Target size of sentence groups when pre-splitting one-segment sources.
    pub sentence_cap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1200,
            overlap: 200,
            sentence_cap: 500,
        }
    }
}

/// Vector retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Nearest-neighbour candidates considered before thresholding.
    pub candidate_pool: usize,
    /// Minimum cosine similarity for a hit.
    pub min_score: f32,
    /// Maximum hits returned.
    pub max_results: usize,
    /// Hits surfaced as citations.
    pub max_citations: usize,
    /// Characters of chunk text kept in a citation snippet.
    pub snippet_chars: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            candidate_pool: 50,
            min_score: 0.65,
            max_results: 8,
            max_citations: 3,
            snippet_chars: 200,
        }
    }
}

/// Answer generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Default chat model when a user has no saved preference.
    pub model: String,
    /// Default sampling temperature.
    pub temperature: f32,
    /// Default output token limit.
    pub max_tokens: u32,
    /// Model used for short title generation during import.
    pub title_model: String,
    /// Token limit used when a model rejects the requested limit without naming its own.
    pub fallback_max_tokens: u32,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            title_model: "gpt-4o-mini".to_string(),
            fallback_max_tokens: 4096,
            timeout_seconds: 120,
        }
    }
}

/// Speech-to-text settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    /// Transcription model.
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
    /// Bitrate assumed when estimating audio duration from file size.
    pub assumed_bitrate_kbps: u32,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            model: "whisper-1".to_string(),
            timeout_seconds: 300,
            assumed_bitrate_kbps: 128,
        }
    }
}

/// YouTube-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeSettings {
    /// yt-dlp executable.
    pub ytdlp_path: String,
    /// Caption languages, in order of preference.
    pub languages: Vec<String>,
    /// Maximum videos taken from one playlist.
    pub playlist_limit: usize,
    /// Timeout for caption downloads in seconds.
    pub timeout_seconds: u64,
}

impl Default for YoutubeSettings {
    fn default() -> Self {
        Self {
            ytdlp_path: "yt-dlp".to_string(),
            languages: vec!["en".to_string(), "en-US".to_string(), "en-GB".to_string()],
            playlist_limit: 200,
            timeout_seconds: 60,
        }
    }
}

/// Ingestion validation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Documents yielding fewer characters are treated as having no text.
    pub min_document_chars: usize,
    /// Transcriptions shorter than this are treated as empty.
    pub min_transcription_chars: usize,
    /// Characters of text shown to the model when deriving a title.
    pub title_preview_chars: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            min_document_chars: 50,
            min_transcription_chars: 10,
            title_preview_chars: 1000,
        }
    }
}

/// HTTP API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
    /// Maximum upload size in megabytes.
    pub max_upload_mb: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            max_upload_mb: 50,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            settings.validate()?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::QuarryError;

        if self.chunking.overlap >= self.chunking.chunk_size {
            return Err(QuarryError::Config(format!(
                "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.overlap, self.chunking.chunk_size
            )));
        }
        if self.embedding.dimensions == 0 {
            return Err(QuarryError::Config("embedding.dimensions must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.retrieval.min_score) {
            return Err(QuarryError::Config(format!(
                "retrieval.min_score ({}) must be between 0.0 and 1.0",
                self.retrieval.min_score
            )));
        }
        Ok(())
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::QuarryError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quarry")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded temp directory path.
    pub fn temp_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.temp_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.store.sqlite_path)
    }
}
