//! Source management commands.

use crate::cli::{Output, SourcesAction};
use crate::config::Settings;
use crate::models::SourcePatch;
use crate::store::{KnowledgeStore, SqliteStore};
use anyhow::{anyhow, Result};

/// Run a sources sub-command. Only the local database is touched.
pub async fn run_sources(action: &SourcesAction, settings: Settings) -> Result<()> {
    let store = SqliteStore::open(&settings)?;

    match action {
        SourcesAction::List => {
            let sources = store.list_sources().await?;
            if sources.is_empty() {
                Output::info("Nothing imported yet. Use 'quarry import' to add content.");
                return Ok(());
            }

            Output::header(&format!("Sources ({})", sources.len()));
            println!();
            for summary in &sources {
                Output::source_line(summary);
            }
            let total_chunks: u32 = sources.iter().map(|s| s.chunk_count).sum();
            println!();
            Output::kv("Total chunks", &total_chunks.to_string());
        }

        SourcesAction::Show { id } => {
            let source = store
                .get_source(*id)
                .await?
                .ok_or_else(|| anyhow!("Source {} not found", id))?;
            let chunks = store.source_chunks(*id).await?;

            Output::header(&source.title);
            Output::kv("Kind", source.kind.label());
            if let Some(author) = &source.author {
                Output::kv("Author", author);
            }
            if let Some(url) = &source.url {
                Output::kv("URL", url);
            }
            if let Some(file_name) = &source.file_name {
                Output::kv("File", file_name);
            }
            Output::kv("Imported", &source.created_at.format("%Y-%m-%d %H:%M").to_string());
            Output::kv("Chunks", &chunks.len().to_string());

            for chunk in &chunks {
                println!(
                    "\n[{}] {}\n{}",
                    chunk.chunk_index,
                    chunk.format_timestamp(),
                    chunk.content
                );
            }
        }

        SourcesAction::Edit { id, title, author } => {
            if title.is_none() && author.is_none() {
                Output::warning("Nothing to change. Pass --title and/or --author.");
                return Ok(());
            }
            let patch = SourcePatch {
                title: title.clone(),
                author: author.clone(),
            };
            let source = store.update_source(*id, &patch).await?;
            Output::success(&format!("Updated \"{}\"", source.title));
        }

        SourcesAction::Delete { id } => {
            let chunks = store.delete_source(*id).await?;
            Output::success(&format!("Deleted source {} and {} chunks", id, chunks));
        }
    }

    Ok(())
}
