//! Application wiring for Quarry.
//!
//! Builds the store, remote clients, import pipeline and chat service from
//! settings. The CLI and the HTTP server both go through one [`Orchestrator`].

use crate::config::{Prompts, Settings};
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::error::Result;
use crate::extract::{FileTextExtractor, TextExtractor};
use crate::generation::{Generator, OpenAIGenerator};
use crate::ingest::{IngestServices, Ingestor};
use crate::rag::ChatService;
use crate::store::{ConversationStore, KnowledgeStore, SqliteStore};
use crate::transcription::{Transcriber, WhisperTranscriber};
use crate::video::{TranscriptProvider, YtDlpTranscriptProvider};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Remote and local collaborators, injectable for tests.
pub struct Components {
    pub store: Arc<SqliteStore>,
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn Generator>,
    pub transcripts: Arc<dyn TranscriptProvider>,
    pub extractor: Arc<dyn TextExtractor>,
    pub transcriber: Arc<dyn Transcriber>,
}

impl Components {
    /// Production components built from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let store = Arc::new(SqliteStore::open(settings)?);
        let embedder = Arc::new(OpenAIEmbedder::from_settings(&settings.embedding)?);
        let generator = Arc::new(OpenAIGenerator::from_settings(&settings.generation)?);
        // One provider, and so one HTTP client, for the life of the process.
        let transcripts = Arc::new(YtDlpTranscriptProvider::new(&settings.youtube)?);
        let transcriber = Arc::new(WhisperTranscriber::from_settings(&settings.transcription)?);

        Ok(Self {
            store,
            embedder,
            generator,
            transcripts,
            extractor: Arc::new(FileTextExtractor),
            transcriber,
        })
    }
}

/// The assembled application.
pub struct Orchestrator {
    settings: Settings,
    store: Arc<SqliteStore>,
    embedder: Arc<dyn Embedder>,
    ingestor: Ingestor,
    chat: ChatService,
    temp_dir: PathBuf,
}

impl Orchestrator {
    /// Build the application with production components.
    pub fn new(settings: Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;
        let components = Components::from_settings(&settings)?;
        Self::with_components(settings, prompts, components)
    }

    /// Build the application around the given components.
    pub fn with_components(settings: Settings, prompts: Prompts, components: Components) -> Result<Self> {
        let temp_dir = settings.temp_dir();
        std::fs::create_dir_all(&temp_dir)?;

        let knowledge: Arc<dyn KnowledgeStore> = components.store.clone();
        let conversations: Arc<dyn ConversationStore> = components.store.clone();

        let ingestor = Ingestor::new(
            IngestServices {
                store: knowledge.clone(),
                embedder: components.embedder.clone(),
                generator: components.generator.clone(),
                transcripts: components.transcripts,
                extractor: components.extractor,
                transcriber: components.transcriber,
            },
            &settings,
            prompts.clone(),
        );
        let chat = ChatService::new(
            knowledge,
            conversations,
            components.embedder.clone(),
            components.generator,
            &settings,
            prompts,
        );

        info!("Quarry ready (store index '{}')", components.store.index_name());
        Ok(Self {
            settings,
            store: components.store,
            embedder: components.embedder,
            ingestor,
            chat,
            temp_dir,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> Arc<SqliteStore> {
        self.store.clone()
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        self.embedder.clone()
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    pub fn chat(&self) -> &ChatService {
        &self.chat
    }

    /// Directory uploads are staged in before import.
    pub fn temp_dir(&self) -> &PathBuf {
        &self.temp_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::SourceInput;
    use crate::testing::{
        indexed_store, MockEmbedder, MockExtractor, MockGenerator, MockTranscriber,
        MockTranscriptProvider,
    };
    use crate::transcription::AudioTranscript;

    #[tokio::test]
    async fn test_import_then_ask() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.general.temp_dir = dir.path().join("uploads").to_string_lossy().into_owned();

        let content = "Borrowing lets code use a value without taking ownership of it.";
        let question = "What does borrowing let code do?";
        let embedder = MockEmbedder::new(4)
            .with_vector(content, vec![1.0, 0.0, 0.0, 0.0])
            .with_vector(question, vec![1.0, 0.1, 0.0, 0.0]);

        let components = Components {
            store: indexed_store(4).await,
            embedder: Arc::new(embedder),
            generator: Arc::new(MockGenerator::new("It lets code use a value without owning it.")),
            transcripts: Arc::new(MockTranscriptProvider::new()),
            extractor: Arc::new(MockExtractor::returning("")),
            transcriber: Arc::new(MockTranscriber::returning(AudioTranscript::plain(""))),
        };
        let app = Orchestrator::with_components(settings, Prompts::default(), components).unwrap();
        assert!(app.temp_dir().exists());

        let outcome = app
            .ingestor()
            .ingest(SourceInput::Text {
                title: Some("Borrowing".to_string()),
                content: content.to_string(),
                author: None,
            })
            .await
            .unwrap();
        assert_eq!(outcome.chunk_count, 1);

        let reply = app.chat().send("alice", None, question).await.unwrap();
        assert_eq!(reply.citations.len(), 1);
        assert_eq!(reply.citations[0].source_id, outcome.source_id);
        assert_eq!(reply.citations[0].title, "Borrowing");
    }
}
