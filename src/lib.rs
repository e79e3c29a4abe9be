//! Quarry - a knowledge base you can talk to
//!
//! Quarry imports YouTube videos, playlists, pasted text, documents and audio
//! recordings, splits them into overlapping chunks, embeds them, and answers
//! questions grounded in the closest chunks with citations back to the source
//! (and, for timed media, the moment in it).
//!
//! # Architecture
//!
//! - `config` - Settings and prompt templates
//! - `video` - YouTube transcripts and playlists via yt-dlp
//! - `extract` - Plain text from PDF, DOCX and text files
//! - `transcription` - Speech-to-text for audio uploads
//! - `chunking` - Character-budget chunking with overlap
//! - `embedding` - Embedding generation
//! - `generation` - Chat completions
//! - `store` - SQLite persistence and vector search
//! - `ingest` - Source import pipeline
//! - `rag` - Retrieval, context assembly and the chat service
//! - `orchestrator` - Wiring of the above from settings
//! - `server` - HTTP API
//! - `cli` - Command line interface
//!
//! # Example
//!
//! ```rust,no_run
//! use quarry::config::Settings;
//! use quarry::ingest::SourceInput;
//! use quarry::orchestrator::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(settings)?;
//!
//!     let outcome = orchestrator
//!         .ingestor()
//!         .ingest(SourceInput::Video {
//!             url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
//!         })
//!         .await?;
//!     println!("Indexed {} chunks", outcome.chunk_count);
//!
//!     let reply = orchestrator.chat().send("local", None, "What is it about?").await?;
//!     println!("{}", reply.answer);
//!
//!     Ok(())
//! }
//! ```

pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod ingest;
pub mod models;
pub mod openai;
pub mod orchestrator;
pub mod rag;
pub mod server;
pub mod store;
pub mod transcription;
pub mod video;

#[cfg(test)]
pub mod testing;

pub use error::{QuarryError, Result};
