//! Configuration module for Quarry.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{CannedReplies, ChatPrompts, Prompts, TitlePrompts};
pub use settings::{
    ChunkingSettings, EmbeddingSettings, GeneralSettings, GenerationSettings, IngestSettings,
    PromptSettings, RetrievalSettings, ServerSettings, Settings, StoreSettings,
    TranscriptionSettings, YoutubeSettings,
};
