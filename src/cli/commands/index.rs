//! Vector index commands.

use crate::cli::{IndexAction, Output};
use crate::config::Settings;
use crate::store::{KnowledgeStore, SqliteStore};
use anyhow::Result;

/// Run an index sub-command.
pub async fn run_index(action: &IndexAction, settings: Settings) -> Result<()> {
    let store = SqliteStore::open(&settings)?;

    match action {
        IndexAction::Create => {
            let info = store
                .ensure_vector_index(settings.embedding.dimensions as usize)
                .await?;
            Output::success(&format!("Vector index \"{}\" is ready", info.name));
            Output::kv("Field", &info.field);
            Output::kv("Filter", &info.filter_field);
            Output::kv("Dimensions", &info.dimensions.to_string());
        }

        IndexAction::Status => {
            let chunks = store.chunk_count().await?;
            match store.vector_index().await? {
                Some(info) => {
                    Output::header(&format!("Vector index \"{}\"", info.name));
                    Output::kv("Field", &info.field);
                    Output::kv("Dimensions", &info.dimensions.to_string());
                    Output::kv("Created", &info.created_at.format("%Y-%m-%d %H:%M").to_string());
                    Output::kv("Chunks", &chunks.to_string());
                }
                None => {
                    Output::warning(&format!(
                        "No vector index \"{}\" yet. Run 'quarry index create'.",
                        store.index_name()
                    ));
                    Output::kv("Chunks", &chunks.to_string());
                }
            }
        }
    }

    Ok(())
}
