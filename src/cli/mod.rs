//! CLI module for Quarry.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

/// Quarry - a knowledge base you can talk to
///
/// Import YouTube videos, articles, documents and audio recordings, then ask
/// questions and get answers that cite where they came from.
#[derive(Parser, Debug)]
#[command(name = "quarry")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// User id that owns conversations and preferences
    #[arg(short, long, global = true, env = "QUARRY_USER", default_value = "local")]
    pub user: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import content into the knowledge base
    Import {
        #[command(subcommand)]
        what: ImportCommand,
    },

    /// List, inspect, edit and delete imported sources
    Sources {
        #[command(subcommand)]
        action: SourcesAction,
    },

    /// Ask a single question
    Ask {
        /// The question to ask
        question: String,

        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<Uuid>,
    },

    /// Start an interactive chat session
    Chat {
        /// Resume an existing conversation
        #[arg(long)]
        conversation: Option<Uuid>,
    },

    /// Manage conversations
    Conversations {
        #[command(subcommand)]
        action: ConversationsAction,
    },

    /// Show or change generation preferences
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },

    /// Manage the vector index
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Start HTTP API server
    Serve {
        /// Host to bind to (defaults to server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (defaults to server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ImportCommand {
    /// Import one YouTube video by URL or id
    Video {
        url: String,
    },

    /// Import every video of a YouTube playlist
    Playlist {
        url: String,
    },

    /// Import text given inline or read from a file
    Text {
        /// Text content (omit when using --file)
        content: Option<String>,

        /// Read the text from this file
        #[arg(short, long, conflicts_with = "content")]
        file: Option<PathBuf>,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        author: Option<String>,
    },

    /// Import a PDF, DOCX or plain-text document
    Document {
        path: PathBuf,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        author: Option<String>,
    },

    /// Transcribe and import an audio file
    Audio {
        path: PathBuf,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        author: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum SourcesAction {
    /// List imported sources
    List,

    /// Show a source and its chunks
    Show {
        id: Uuid,
    },

    /// Change a source's title or author
    Edit {
        id: Uuid,

        #[arg(short, long)]
        title: Option<String>,

        /// New author (empty string clears it)
        #[arg(short, long)]
        author: Option<String>,
    },

    /// Delete a source and all of its chunks
    Delete {
        id: Uuid,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConversationsAction {
    /// List your conversations, most recent first
    List,

    /// Start an empty conversation
    New {
        #[arg(short, long)]
        title: Option<String>,

        /// System prompt used only in this conversation
        #[arg(short, long)]
        system_prompt: Option<String>,
    },

    /// Print a conversation with its citations
    Show {
        id: Uuid,
    },

    /// Rename a conversation
    Rename {
        id: Uuid,
        title: String,
    },

    /// Set or clear a conversation's system prompt
    Prompt {
        id: Uuid,

        /// New prompt; omit to clear
        prompt: Option<String>,
    },

    /// Delete a conversation
    Delete {
        id: Uuid,
    },
}

#[derive(Subcommand, Debug)]
pub enum PrefsAction {
    /// Show current preferences
    Show,

    /// Update preferences
    Set {
        #[arg(short, long)]
        model: Option<String>,

        #[arg(short, long)]
        temperature: Option<f32>,

        #[arg(long)]
        max_tokens: Option<u32>,

        /// Default system prompt (empty string clears it)
        #[arg(short, long)]
        system_prompt: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum IndexAction {
    /// Provision the vector index for the configured embedding dimension
    Create,

    /// Show the vector index and chunk count
    Status,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}
