//! Persistence for the knowledge base and for conversations.
//!
//! Sources and chunks are global; conversations and preferences are owned
//! by a user id. [`SqliteStore`] implements both traits over one database.

mod conversations;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::models::{
    Chunk, ChunkPreview, Conversation, ConversationSummary, SearchHit, Source, SourcePatch,
    SourceSummary, Turn, UserPreferences,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Field of the chunk table the vector index covers.
pub const VECTOR_FIELD: &str = "embedding";
/// Field the vector index can be filtered on.
pub const VECTOR_FILTER_FIELD: &str = "source_id";

/// Registered vector index over chunk embeddings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndexInfo {
    pub name: String,
    pub field: String,
    pub filter_field: String,
    pub dimensions: usize,
    pub created_at: DateTime<Utc>,
}

/// Bounds for one similarity search.
#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    /// Nearest neighbours considered before thresholding.
    pub candidate_pool: usize,
    pub min_score: f32,
    pub limit: usize,
}

impl From<&crate::config::RetrievalSettings> for SearchParams {
    fn from(settings: &crate::config::RetrievalSettings) -> Self {
        Self {
            candidate_pool: settings.candidate_pool,
            min_score: settings.min_score,
            limit: settings.max_results,
        }
    }
}

/// Sources, chunks and vector search.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Insert a new source. Fails with `DuplicateSource` if its external id is taken.
    async fn insert_source(&self, source: &Source) -> Result<()>;

    /// Insert a source's chunks in one transaction.
    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<usize>;

    async fn get_source(&self, id: Uuid) -> Result<Option<Source>>;

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Source>>;

    /// All sources, newest first, with chunk counts.
    async fn list_sources(&self) -> Result<Vec<SourceSummary>>;

    /// Edit a source's title or author.
    async fn update_source(&self, id: Uuid, patch: &SourcePatch) -> Result<Source>;

    /// Delete a source and all of its chunks. Returns the number of chunks removed.
    async fn delete_source(&self, id: Uuid) -> Result<usize>;

    /// A source's chunks in index order, without embeddings.
    async fn source_chunks(&self, id: Uuid) -> Result<Vec<ChunkPreview>>;

    async fn chunk_count(&self) -> Result<usize>;

    /// Rank chunks by cosine similarity to `query`.
    ///
    /// Only the top `candidate_pool` chunks are considered; of those, hits
    /// scoring below `min_score` are dropped and at most `limit` are returned.
    /// Chunks whose source cannot be resolved are never returned.
    async fn search(&self, query: &[f32], params: SearchParams) -> Result<Vec<SearchHit>>;

    /// The registered vector index, if provisioned.
    async fn vector_index(&self) -> Result<Option<VectorIndexInfo>>;

    /// Provision the vector index for the given dimension.
    async fn ensure_vector_index(&self, dimensions: usize) -> Result<VectorIndexInfo>;
}

/// Conversations, turns and per-user preferences.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(
        &self,
        user_id: &str,
        title: &str,
        system_prompt: Option<&str>,
    ) -> Result<Conversation>;

    /// Fetch a conversation with its turns. Conversations owned by another user are not visible.
    async fn get_conversation(&self, user_id: &str, id: Uuid) -> Result<Option<Conversation>>;

    /// The user's conversations, most recent activity first.
    async fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationSummary>>;

    async fn rename_conversation(&self, user_id: &str, id: Uuid, title: &str) -> Result<()>;

    async fn set_conversation_prompt(
        &self,
        user_id: &str,
        id: Uuid,
        system_prompt: Option<&str>,
    ) -> Result<()>;

    async fn delete_conversation(&self, user_id: &str, id: Uuid) -> Result<()>;

    /// Append a user turn and its reply, record context sources and bump activity,
    /// all in one transaction.
    async fn append_exchange(
        &self,
        user_id: &str,
        id: Uuid,
        user_turn: &Turn,
        assistant_turn: &Turn,
        context_sources: &[Uuid],
    ) -> Result<()>;

    async fn get_preferences(&self, user_id: &str) -> Result<Option<UserPreferences>>;

    async fn save_preferences(&self, preferences: &UserPreferences) -> Result<()>;
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &[2.0, 0.0, 0.0]) - 1.0).abs() < 0.001);
        assert!(cosine_similarity(&a, &[0.0, 1.0, 0.0]).abs() < 0.001);
        assert!((cosine_similarity(&a, &[-1.0, 0.0, 0.0]) + 1.0).abs() < 0.001);
        assert_eq!(cosine_similarity(&a, &[1.0, 0.0]), 0.0);
    }
}
