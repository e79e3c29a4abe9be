//! Pre-flight checks before expensive operations.
//!
//! Validates that required tools and configuration are available
//! before starting operations that would otherwise fail midway.

use crate::config::Settings;
use crate::error::{QuarryError, Result};
use std::process::Command;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Video and playlist imports need yt-dlp and the API key.
    ImportVideo,
    /// Text, document and audio imports need the API key for embeddings.
    Import,
    /// Asking and chatting need the API key.
    Ask,
    /// Listing and editing only touch the local database.
    Local,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::ImportVideo => {
            check_api_key()?;
            check_tool(&settings.youtube.ytdlp_path)?;
        }
        Operation::Import | Operation::Ask => {
            check_api_key()?;
        }
        Operation::Local => {}
    }
    Ok(())
}

/// Check if OpenAI API key is configured.
fn check_api_key() -> Result<()> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(()),
        Ok(_) => Err(QuarryError::Config(
            "OPENAI_API_KEY is empty. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
        Err(_) => Err(QuarryError::Config(
            "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
    }
}

/// Check if an external tool is available.
fn check_tool(name: &str) -> Result<()> {
    match Command::new(name).arg("--version").output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(QuarryError::ToolNotFound(format!(
            "{} is installed but not working correctly",
            name
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(QuarryError::ToolNotFound(name.to_string()))
        }
        Err(e) => Err(QuarryError::ToolNotFound(format!("{}: {}", name, e))),
    }
}
