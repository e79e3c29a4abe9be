//! Embedding generation for semantic search and retrieval.

mod openai;

pub use openai::OpenAIEmbedder;

use crate::error::{QuarryError, Result};
use async_trait::async_trait;

/// Trait for embedding generation.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimensions.
    fn dimensions(&self) -> usize;
}

/// Check that a provider response has one vector of the expected length per input.
pub fn validate_embeddings(
    embeddings: &[Vec<f32>],
    expected_count: usize,
    dimensions: usize,
) -> Result<()> {
    if embeddings.len() != expected_count {
        return Err(QuarryError::Embedding(format!(
            "Expected {} embeddings, received {}",
            expected_count,
            embeddings.len()
        )));
    }
    if let Some((i, bad)) = embeddings
        .iter()
        .enumerate()
        .find(|(_, e)| e.len() != dimensions)
    {
        return Err(QuarryError::Embedding(format!(
            "Embedding {} has {} dimensions, expected {}",
            i,
            bad.len(),
            dimensions
        )));
    }
    Ok(())
}
