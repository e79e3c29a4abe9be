//! Conversation-aware question answering.

use super::classifier::{HeuristicClassifier, QueryClassifier};
use super::context::{build_citations, format_context_block};
use super::retriever::{NoMatchReason, RetrievalOutcome, Retriever};
use crate::chunking::truncate_at_word;
use crate::config::{GenerationSettings, Prompts, RetrievalSettings, Settings};
use crate::embedding::Embedder;
use crate::error::{QuarryError, Result};
use crate::generation::{
    generate_with_adjustment, GenerationParams, GenerationRequest, Generator, HistoryMessage,
};
use crate::models::{
    Citation, Conversation, ConversationSummary, PreferencesPatch, Turn, UserPreferences,
};
use crate::store::{ConversationStore, KnowledgeStore, SearchParams};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Maximum prior turns sent to the model as history.
const MAX_HISTORY_TURNS: usize = 20;
/// Conversation titles are cut from the first message at about this length.
const TITLE_CHARS: usize = 50;
const DEFAULT_CONVERSATION_TITLE: &str = "New conversation";

/// Answer to one chat message.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub conversation_id: Uuid,
}

/// Chat orchestration plus conversation and preference management.
pub struct ChatService {
    retriever: Retriever,
    conversations: Arc<dyn ConversationStore>,
    generator: Arc<dyn Generator>,
    classifier: Arc<dyn QueryClassifier>,
    prompts: Prompts,
    retrieval: RetrievalSettings,
    defaults: GenerationSettings,
}

impl ChatService {
    pub fn new(
        knowledge: Arc<dyn KnowledgeStore>,
        conversations: Arc<dyn ConversationStore>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        settings: &Settings,
        prompts: Prompts,
    ) -> Self {
        Self {
            retriever: Retriever::new(knowledge, embedder, SearchParams::from(&settings.retrieval)),
            conversations,
            generator,
            classifier: Arc::new(HeuristicClassifier),
            prompts,
            retrieval: settings.retrieval.clone(),
            defaults: settings.generation.clone(),
        }
    }

    /// Replace the retrieval gate.
    pub fn with_classifier(mut self, classifier: Arc<dyn QueryClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Answer a message, continuing `conversation_id` or starting a new conversation.
    ///
    /// Both turns are stored together once an answer exists; a failed
    /// generation stores nothing.
    #[instrument(skip(self, message), fields(user = %user_id))]
    pub async fn send(
        &self,
        user_id: &str,
        conversation_id: Option<Uuid>,
        message: &str,
    ) -> Result<ChatReply> {
        let message = message.trim();
        if message.is_empty() {
            return Err(QuarryError::Validation("Message is empty".to_string()));
        }

        let existing = match conversation_id {
            Some(id) => Some(self.get_conversation(user_id, id).await?),
            None => None,
        };
        let preferences = self.get_preferences(user_id).await?;

        let retrieval = if self.classifier.needs_retrieval(message) {
            Some(self.retriever.retrieve(message).await?)
        } else {
            debug!("Message does not need retrieval");
            None
        };

        let (answer, citations, context_sources) = match retrieval {
            Some(RetrievalOutcome::NoRelevantInformation(reason)) => {
                info!("No relevant information ({:?}), replying without generation", reason);
                (self.canned_reply(reason), Vec::new(), Vec::new())
            }
            Some(RetrievalOutcome::Hits(hits)) => {
                let context = format_context_block(&hits);
                let request = self.build_request(existing.as_ref(), &preferences, message, Some(&context));
                let answer = generate_with_adjustment(
                    self.generator.as_ref(),
                    request,
                    self.defaults.fallback_max_tokens,
                )
                .await?;

                let mut sources: Vec<Uuid> = Vec::new();
                for hit in &hits {
                    if !sources.contains(&hit.source.id) {
                        sources.push(hit.source.id);
                    }
                }
                let citations = build_citations(
                    &hits,
                    self.retrieval.max_citations,
                    self.retrieval.snippet_chars,
                );
                (answer, citations, sources)
            }
            None => {
                let request = self.build_request(existing.as_ref(), &preferences, message, None);
                let answer = generate_with_adjustment(
                    self.generator.as_ref(),
                    request,
                    self.defaults.fallback_max_tokens,
                )
                .await?;
                (answer, Vec::new(), Vec::new())
            }
        };

        let conversation_id = match existing {
            Some(conversation) => conversation.id,
            None => {
                let title = truncate_at_word(message, TITLE_CHARS);
                self.conversations
                    .create_conversation(user_id, &title, None)
                    .await?
                    .id
            }
        };

        self.conversations
            .append_exchange(
                user_id,
                conversation_id,
                &Turn::user(message, citations.clone()),
                &Turn::assistant(answer.clone()),
                &context_sources,
            )
            .await?;

        Ok(ChatReply {
            answer,
            citations,
            conversation_id,
        })
    }

    fn canned_reply(&self, reason: NoMatchReason) -> String {
        match reason {
            NoMatchReason::EmptyLibrary => self.prompts.canned.empty_library.clone(),
            NoMatchReason::BelowThreshold => self.prompts.canned.no_match.clone(),
        }
    }

    /// Conversation prompt, then the user's default, then the library default;
    /// retrieved context goes after whichever applies.
    fn build_request(
        &self,
        conversation: Option<&Conversation>,
        preferences: &UserPreferences,
        message: &str,
        context: Option<&str>,
    ) -> GenerationRequest {
        let base = conversation
            .and_then(|c| c.system_prompt.as_deref())
            .or(preferences.default_system_prompt.as_deref())
            .unwrap_or(&self.prompts.chat.system);
        let mut system_prompt = self.prompts.render_with_custom(base, &HashMap::new());

        if let Some(context) = context {
            let mut vars = HashMap::new();
            vars.insert("context".to_string(), context.to_string());
            system_prompt.push_str(&self.prompts.render_with_custom(&self.prompts.chat.context, &vars));
        }

        let history = conversation
            .map(|c| {
                let skip = c.turns.len().saturating_sub(MAX_HISTORY_TURNS);
                c.turns
                    .iter()
                    .skip(skip)
                    .map(|t| HistoryMessage {
                        role: t.role,
                        content: t.content.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        GenerationRequest {
            system_prompt,
            history,
            user_message: message.to_string(),
            params: GenerationParams::new(
                &preferences.model,
                preferences.temperature,
                preferences.max_tokens,
            ),
        }
    }

    pub async fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationSummary>> {
        self.conversations.list_conversations(user_id).await
    }

    /// Start an empty conversation, optionally with its own system prompt.
    pub async fn create_conversation(
        &self,
        user_id: &str,
        title: Option<&str>,
        system_prompt: Option<&str>,
    ) -> Result<Conversation> {
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_CONVERSATION_TITLE);
        let system_prompt = system_prompt.map(str::trim).filter(|p| !p.is_empty());
        self.conversations
            .create_conversation(user_id, title, system_prompt)
            .await
    }

    pub async fn get_conversation(&self, user_id: &str, id: Uuid) -> Result<Conversation> {
        self.conversations
            .get_conversation(user_id, id)
            .await?
            .ok_or_else(|| QuarryError::NotFound(format!("conversation {}", id)))
    }

    pub async fn rename_conversation(&self, user_id: &str, id: Uuid, title: &str) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(QuarryError::Validation("Title must not be empty".to_string()));
        }
        self.conversations.rename_conversation(user_id, id, title).await
    }

    /// Set or clear (`None` or blank) a conversation's system prompt.
    pub async fn set_conversation_prompt(
        &self,
        user_id: &str,
        id: Uuid,
        system_prompt: Option<&str>,
    ) -> Result<()> {
        let system_prompt = system_prompt.map(str::trim).filter(|p| !p.is_empty());
        self.conversations
            .set_conversation_prompt(user_id, id, system_prompt)
            .await
    }

    pub async fn delete_conversation(&self, user_id: &str, id: Uuid) -> Result<()> {
        self.conversations.delete_conversation(user_id, id).await
    }

    /// Saved preferences, or the configured defaults for a user without any.
    pub async fn get_preferences(&self, user_id: &str) -> Result<UserPreferences> {
        Ok(self
            .conversations
            .get_preferences(user_id)
            .await?
            .unwrap_or_else(|| UserPreferences {
                user_id: user_id.to_string(),
                model: self.defaults.model.clone(),
                temperature: self.defaults.temperature,
                max_tokens: self.defaults.max_tokens,
                default_system_prompt: None,
            }))
    }

    pub async fn update_preferences(
        &self,
        user_id: &str,
        patch: PreferencesPatch,
    ) -> Result<UserPreferences> {
        let mut preferences = self.get_preferences(user_id).await?;
        preferences.apply(patch)?;
        self.conversations.save_preferences(&preferences).await?;
        Ok(preferences)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, Source, SourceKind, TurnRole};
    use crate::store::SqliteStore;
    use crate::testing::{indexed_store, MockEmbedder, MockGenerator};

    const QUESTION: &str = "What is ownership in Rust?";

    struct Harness {
        store: Arc<SqliteStore>,
        embedder: Arc<MockEmbedder>,
        generator: Arc<MockGenerator>,
        chat: ChatService,
    }

    fn build(store: Arc<SqliteStore>, embedder: MockEmbedder, generator: MockGenerator) -> Harness {
        let embedder = Arc::new(embedder);
        let generator = Arc::new(generator);
        let chat = ChatService::new(
            store.clone(),
            store.clone(),
            embedder.clone(),
            generator.clone(),
            &Settings::default(),
            Prompts::default(),
        );
        Harness { store, embedder, generator, chat }
    }

    /// A store with one video chunk at [1, 0, 0] and an embedder mapping the
    /// test question onto the same direction.
    async fn library() -> (Arc<SqliteStore>, MockEmbedder, Source) {
        let store = indexed_store(3).await;
        let mut source = Source::new(SourceKind::Video, "Rust Ownership");
        source.author = Some("Ferris".to_string());
        source.external_id = Some("dQw4w9WgXcQ".to_string());
        store.insert_source(&source).await.unwrap();
        store
            .insert_chunks(&[Chunk::new(
                source.id,
                "Ownership means each value has a single owner.".to_string(),
                vec![1.0, 0.0, 0.0],
                95.0,
                0,
            )])
            .await
            .unwrap();

        let embedder = MockEmbedder::new(3)
            .with_vector(QUESTION, vec![0.9, 0.1, 0.0])
            .with_vector("Where do penguins live?", vec![0.0, 0.0, 1.0]);
        (store, embedder, source)
    }

    #[tokio::test]
    async fn test_empty_library_returns_canned_answer() {
        let h = build(indexed_store(3).await, MockEmbedder::new(3), MockGenerator::new("unused"));

        let reply = h.chat.send("alice", None, QUESTION).await.unwrap();
        assert_eq!(reply.answer, Prompts::default().canned.empty_library);
        assert!(reply.citations.is_empty());
        assert_eq!(h.generator.call_count(), 0);

        let conversation = h.chat.get_conversation("alice", reply.conversation_id).await.unwrap();
        assert_eq!(conversation.turns.len(), 2);
    }

    #[tokio::test]
    async fn test_below_threshold_never_calls_generation() {
        let (store, embedder, _) = library().await;
        let h = build(store, embedder, MockGenerator::new("unused"));

        let reply = h.chat.send("alice", None, "Where do penguins live?").await.unwrap();
        assert_eq!(reply.answer, Prompts::default().canned.no_match);
        assert_eq!(h.generator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_question_uses_context_and_cites_on_user_turn() {
        let (store, embedder, source) = library().await;
        let h = build(store, embedder, MockGenerator::new("Each value has one owner."));

        let reply = h.chat.send("alice", None, QUESTION).await.unwrap();
        assert_eq!(reply.answer, "Each value has one owner.");
        assert_eq!(reply.citations.len(), 1);
        assert_eq!(reply.citations[0].timestamp.as_deref(), Some("01:35"));
        assert!(reply.citations[0].url.as_deref().unwrap().ends_with("&t=95s"));

        let request = &h.generator.requests()[0];
        assert!(request.system_prompt.starts_with(&Prompts::default().chat.system));
        assert!(request.system_prompt.contains("[Video by Ferris] Rust Ownership (01:35)"));
        assert_eq!(request.user_message, QUESTION);
        assert!(request.history.is_empty());

        let conversation = h.chat.get_conversation("alice", reply.conversation_id).await.unwrap();
        assert_eq!(conversation.title, "What is ownership in Rust?");
        assert_eq!(conversation.turns[0].role, TurnRole::User);
        assert_eq!(conversation.turns[0].citations.len(), 1);
        assert!(conversation.turns[1].citations.is_empty());
        assert_eq!(conversation.context_sources, vec![source.id]);
    }

    #[tokio::test]
    async fn test_filler_skips_retrieval_but_persists_turns() {
        let (store, embedder, _) = library().await;
        let h = build(store, embedder, MockGenerator::new("You're welcome!"));

        let first = h.chat.send("alice", None, QUESTION).await.unwrap();
        let embeds_after_question = h.embedder.embed_calls();

        let reply = h.chat.send("alice", Some(first.conversation_id), "thanks!").await.unwrap();
        assert_eq!(reply.answer, "You're welcome!");
        assert!(reply.citations.is_empty());
        assert_eq!(h.embedder.embed_calls(), embeds_after_question);

        let request = &h.generator.requests()[1];
        assert!(!request.system_prompt.contains("Relevant context"));
        assert_eq!(request.history.len(), 2);
        assert_eq!(request.history[1].role, TurnRole::Assistant);

        let conversation = h.chat.get_conversation("alice", first.conversation_id).await.unwrap();
        assert_eq!(conversation.turns.len(), 4);
    }

    #[tokio::test]
    async fn test_prompt_precedence() {
        let (store, embedder, _) = library().await;
        let h = build(store, embedder, MockGenerator::new("ok"));

        h.chat
            .update_preferences(
                "alice",
                PreferencesPatch {
                    default_system_prompt: Some("User default.".to_string()),
                    temperature: Some(0.2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        h.chat.send("alice", None, "hello").await.unwrap();

        let conversation = h
            .chat
            .create_conversation("alice", Some("Pirate talk"), Some("Answer like a pirate."))
            .await
            .unwrap();
        h.chat.send("alice", Some(conversation.id), "hello").await.unwrap();

        let requests = h.generator.requests();
        assert_eq!(requests[0].system_prompt, "User default.");
        assert_eq!(requests[0].params.temperature, Some(0.2));
        assert_eq!(requests[1].system_prompt, "Answer like a pirate.");
    }

    #[tokio::test]
    async fn test_generation_failure_persists_nothing() {
        let (store, embedder, _) = library().await;
        let h = build(store, embedder, MockGenerator::failing("provider down"));

        let err = h.chat.send("alice", None, QUESTION).await.unwrap_err();
        assert!(matches!(err, QuarryError::Generation(_)));
        assert!(h.chat.list_conversations("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_not_found() {
        let h = build(indexed_store(3).await, MockEmbedder::new(3), MockGenerator::new("x"));
        let err = h.chat.send("alice", Some(Uuid::new_v4()), "hello").await.unwrap_err();
        assert!(matches!(err, QuarryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_long_first_message_title_is_truncated() {
        let h = build(indexed_store(3).await, MockEmbedder::new(3), MockGenerator::new("x"));
        let message = "How does the overlap between neighbouring chunks affect retrieval quality overall?";

        let reply = h.chat.send("alice", None, message).await.unwrap();
        let conversation = h.chat.get_conversation("alice", reply.conversation_id).await.unwrap();
        assert_eq!(conversation.title, "How does the overlap between neighbouring chunks...");
        assert!(h.store.chunk_count().await.unwrap() == 0);
    }

    #[tokio::test]
    async fn test_preferences_default_then_update() {
        let h = build(indexed_store(3).await, MockEmbedder::new(3), MockGenerator::new("x"));

        let defaults = h.chat.get_preferences("bob").await.unwrap();
        assert_eq!(defaults.model, GenerationSettings::default().model);

        let err = h
            .chat
            .update_preferences("bob", PreferencesPatch { temperature: Some(3.0), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, QuarryError::Validation(_)));

        let updated = h
            .chat
            .update_preferences("bob", PreferencesPatch { max_tokens: Some(256), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(updated.max_tokens, 256);
        assert_eq!(h.chat.get_preferences("bob").await.unwrap().max_tokens, 256);
    }
}
