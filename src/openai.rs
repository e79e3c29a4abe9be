//! OpenAI client construction with bounded request timeouts.

use crate::error::{QuarryError, Result};
use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;

/// Create an OpenAI client whose HTTP calls fail after `timeout`.
///
/// Every remote model call (embedding, generation, transcription) goes
/// through a client built here, so none of them can hang indefinitely.
pub fn create_client_with_timeout(timeout: Duration) -> Result<Client<OpenAIConfig>> {
    let http_client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| QuarryError::Config(format!("Failed to create HTTP client: {}", e)))?;

    Ok(Client::with_config(OpenAIConfig::default()).with_http_client(http_client))
}

/// Create an OpenAI client with a timeout given in whole seconds.
pub fn create_client(timeout_seconds: u64) -> Result<Client<OpenAIConfig>> {
    create_client_with_timeout(Duration::from_secs(timeout_seconds.max(1)))
}
