//! Per-video outcome of a playlist import.

use super::IngestOutcome;
use crate::error::{QuarryError, Result};
use serde::Serialize;
use uuid::Uuid;

/// What happened to one playlist entry.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlaylistItemStatus {
    Imported { source_id: Uuid, title: String },
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaylistItem {
    pub video_id: String,
    #[serde(flatten)]
    pub status: PlaylistItemStatus,
}

/// Summary of a playlist import.
#[derive(Debug, Clone, Serialize)]
pub struct PlaylistReport {
    pub playlist_id: String,
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
    pub items: Vec<PlaylistItem>,
}

impl PlaylistReport {
    pub fn new(playlist_id: impl Into<String>) -> Self {
        Self {
            playlist_id: playlist_id.into(),
            imported: 0,
            skipped: 0,
            failed: 0,
            items: Vec::new(),
        }
    }

    /// Record the result of importing one video. Already-imported videos count as skipped.
    pub fn record(&mut self, video_id: String, result: Result<IngestOutcome>) {
        let status = match result {
            Ok(outcome) => {
                self.imported += 1;
                PlaylistItemStatus::Imported {
                    source_id: outcome.source_id,
                    title: outcome.title,
                }
            }
            Err(e @ QuarryError::DuplicateSource { .. }) => {
                self.skipped += 1;
                PlaylistItemStatus::Skipped { reason: e.to_string() }
            }
            Err(e) => {
                self.failed += 1;
                PlaylistItemStatus::Failed { error: e.to_string() }
            }
        };
        self.items.push(PlaylistItem { video_id, status });
    }
}
