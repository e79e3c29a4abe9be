//! Answer generation through a remote chat model.
//!
//! The [`Generator`] trait is the seam to the provider. Models differ in what
//! they accept (some refuse a custom temperature, some cap output tokens lower
//! than requested), so [`generate_with_adjustment`] retries a rejected request
//! exactly once with the offending parameter adjusted.

mod openai;

pub use openai::OpenAIGenerator;

use crate::error::{QuarryError, Result};
use crate::models::TurnRole;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Which request field carries the output token limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TokenLimitField {
    #[default]
    MaxTokens,
    MaxCompletionTokens,
}

/// Sampling parameters for one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub model: String,
    /// `None` leaves the provider default in place.
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub token_field: TokenLimitField,
}

impl GenerationParams {
    pub fn new(model: impl Into<String>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            temperature: Some(temperature),
            max_tokens: Some(max_tokens),
            token_field: TokenLimitField::MaxTokens,
        }
    }
}

/// A prior conversation message passed to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryMessage {
    pub role: TurnRole,
    pub content: String,
}

/// Everything the model needs to produce one reply.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub history: Vec<HistoryMessage>,
    pub user_message: String,
    pub params: GenerationParams,
}

/// Trait for chat-completion providers.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce a reply. A provider that rejects a parameter value must report
    /// it as [`QuarryError::UnsupportedParameter`].
    async fn complete(&self, request: &GenerationRequest) -> Result<String>;
}

/// Call the generator, retrying once if the model rejects a parameter that can be adjusted.
pub async fn generate_with_adjustment(
    generator: &dyn Generator,
    mut request: GenerationRequest,
    fallback_max_tokens: u32,
) -> Result<String> {
    match generator.complete(&request).await {
        Err(QuarryError::UnsupportedParameter { param, message }) => {
            let Some(adjusted) =
                adjust_params(&request.params, &param, &message, fallback_max_tokens)
            else {
                warn!("Model rejected '{}' and no adjustment is possible", param);
                return Err(QuarryError::Generation(message));
            };
            info!(
                "Model {} rejected '{}', retrying once with adjusted parameters",
                request.params.model, param
            );
            request.params = adjusted;
            generator.complete(&request).await.map_err(|e| match e {
                QuarryError::UnsupportedParameter { message, .. } => QuarryError::Generation(message),
                other => other,
            })
        }
        other => other,
    }
}

/// Derive parameters that address a provider rejection, or `None` if nothing would change.
pub fn adjust_params(
    params: &GenerationParams,
    param: &str,
    message: &str,
    fallback_max_tokens: u32,
) -> Option<GenerationParams> {
    let mut adjusted = params.clone();

    if param.contains("temperature") {
        adjusted.temperature.take()?;
        return Some(adjusted);
    }

    if param == "max_tokens"
        && params.token_field == TokenLimitField::MaxTokens
        && message.contains("max_completion_tokens")
    {
        adjusted.token_field = TokenLimitField::MaxCompletionTokens;
        return Some(adjusted);
    }

    if param == "max_tokens" || param == "max_completion_tokens" {
        let requested = params.max_tokens?;
        let ceiling = parse_token_ceiling(message).unwrap_or(fallback_max_tokens);
        let limited = requested.min(ceiling);
        if limited == requested {
            return None;
        }
        adjusted.max_tokens = Some(limited);
        return Some(adjusted);
    }

    None
}

/// Extract the model's token ceiling from an error such as
/// "This model supports at most 4096 completion tokens".
fn parse_token_ceiling(message: &str) -> Option<u32> {
    let pattern = Regex::new(r"(?i)(?:at most|maximum(?: of| is)?|up to)\s+(\d+)").ok()?;
    pattern
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
