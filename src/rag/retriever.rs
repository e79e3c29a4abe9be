//! Similarity search over the knowledge base.

use crate::embedding::Embedder;
use crate::error::Result;
use crate::models::SearchHit;
use crate::store::{KnowledgeStore, SearchParams};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Why retrieval came back empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoMatchReason {
    /// The knowledge base holds no chunks at all.
    EmptyLibrary,
    /// Nothing scored at or above the similarity threshold.
    BelowThreshold,
}

/// Result of a retrieval attempt. An empty result is not an error.
#[derive(Debug, Clone)]
pub enum RetrievalOutcome {
    Hits(Vec<SearchHit>),
    NoRelevantInformation(NoMatchReason),
}

/// Embeds a query and runs the thresholded vector search.
pub struct Retriever {
    store: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    params: SearchParams,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        embedder: Arc<dyn Embedder>,
        params: SearchParams,
    ) -> Self {
        Self {
            store,
            embedder,
            params,
        }
    }

    #[instrument(skip(self, query))]
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalOutcome> {
        if self.store.chunk_count().await? == 0 {
            debug!("Knowledge base is empty, skipping search");
            return Ok(RetrievalOutcome::NoRelevantInformation(NoMatchReason::EmptyLibrary));
        }

        let embedding = self.embedder.embed(query).await?;
        let hits = self.store.search(&embedding, self.params).await?;
        debug!("Retrieved {} hits", hits.len());

        if hits.is_empty() {
            Ok(RetrievalOutcome::NoRelevantInformation(NoMatchReason::BelowThreshold))
        } else {
            Ok(RetrievalOutcome::Hits(hits))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, Source, SourceKind};
    use crate::testing::{indexed_store, MockEmbedder};

    fn params() -> SearchParams {
        SearchParams {
            candidate_pool: 50,
            min_score: 0.65,
            limit: 8,
        }
    }

    #[tokio::test]
    async fn test_empty_library_skips_embedding() {
        let store = indexed_store(3).await;
        let embedder = Arc::new(MockEmbedder::new(3));
        let retriever = Retriever::new(store, embedder.clone(), params());

        let outcome = retriever.retrieve("anything?").await.unwrap();
        assert!(matches!(
            outcome,
            RetrievalOutcome::NoRelevantInformation(NoMatchReason::EmptyLibrary)
        ));
        assert_eq!(embedder.embed_calls(), 0);
    }

    #[tokio::test]
    async fn test_weak_match_is_below_threshold() {
        let store = indexed_store(3).await;
        let source = Source::new(SourceKind::Text, "Notes");
        store.insert_source(&source).await.unwrap();
        store
            .insert_chunks(&[Chunk::new(source.id, "cats".to_string(), vec![1.0, 0.0, 0.0], 0.0, 0)])
            .await
            .unwrap();

        // cos = 0.6 against the stored chunk
        let embedder = Arc::new(MockEmbedder::new(3).with_vector("dogs", vec![0.6, 0.8, 0.0]));
        let retriever = Retriever::new(store, embedder, params());

        let outcome = retriever.retrieve("dogs").await.unwrap();
        assert!(matches!(
            outcome,
            RetrievalOutcome::NoRelevantInformation(NoMatchReason::BelowThreshold)
        ));
    }
}
