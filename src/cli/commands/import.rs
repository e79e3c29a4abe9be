//! Import command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::{ImportCommand, Output};
use crate::config::Settings;
use crate::ingest::{IngestOutcome, PlaylistItemStatus, SourceInput, Upload};
use crate::orchestrator::Orchestrator;
use anyhow::{bail, Result};

/// Run the import command.
pub async fn run_import(what: &ImportCommand, settings: Settings) -> Result<()> {
    let operation = match what {
        ImportCommand::Video { .. } | ImportCommand::Playlist { .. } => Operation::ImportVideo,
        _ => Operation::Import,
    };
    if let Err(e) = preflight::check(operation, &settings) {
        Output::error(&e.to_string());
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings)?;

    let input = match what {
        ImportCommand::Playlist { url } => return import_playlist(&orchestrator, url).await,
        ImportCommand::Video { url } => SourceInput::Video { url: url.clone() },
        ImportCommand::Text { content, file, title, author } => {
            let content = match (content, file) {
                (Some(content), _) => content.clone(),
                (None, Some(path)) => tokio::fs::read_to_string(path).await?,
                (None, None) => bail!("Provide the text inline or with --file"),
            };
            SourceInput::Text {
                title: title.clone(),
                content,
                author: author.clone(),
            }
        }
        ImportCommand::Document { path, title, author } => SourceInput::Document {
            upload: Upload::existing(path),
            title: title.clone(),
            author: author.clone(),
        },
        ImportCommand::Audio { path, title, author } => SourceInput::Audio {
            upload: Upload::existing(path),
            title: title.clone(),
            author: author.clone(),
        },
    };

    let spinner = Output::spinner("Importing...");
    let result = orchestrator.ingestor().ingest(input).await;
    spinner.finish_and_clear();

    match result {
        Ok(outcome) => {
            print_outcome(&outcome);
            Ok(())
        }
        Err(e) => {
            Output::error(&e.to_string());
            Err(e.into())
        }
    }
}

async fn import_playlist(orchestrator: &Orchestrator, url: &str) -> Result<()> {
    let spinner = Output::spinner("Importing playlist...");
    let report = orchestrator.ingestor().import_playlist(url).await;
    spinner.finish_and_clear();
    let report = report?;

    Output::header(&format!("Playlist {}", report.playlist_id));
    for item in &report.items {
        match &item.status {
            PlaylistItemStatus::Imported { title, .. } => {
                Output::list_item(&format!("{} imported: {}", item.video_id, title))
            }
            PlaylistItemStatus::Skipped { reason } => {
                Output::list_item(&format!("{} skipped: {}", item.video_id, reason))
            }
            PlaylistItemStatus::Failed { error } => {
                Output::warning(&format!("{} failed: {}", item.video_id, error))
            }
        }
    }
    println!();
    Output::kv("Imported", &report.imported.to_string());
    Output::kv("Skipped", &report.skipped.to_string());
    Output::kv("Failed", &report.failed.to_string());
    Ok(())
}

fn print_outcome(outcome: &IngestOutcome) {
    Output::success(&format!("Imported \"{}\"", outcome.title));
    Output::kv("Kind", outcome.kind.label());
    Output::kv("Chunks", &outcome.chunk_count.to_string());
    Output::kv("Source id", &outcome.source_id.to_string());
}
