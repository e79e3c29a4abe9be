//! OpenAI chat-completions implementation.

use super::{GenerationRequest, Generator, TokenLimitField};
use crate::config::GenerationSettings;
use crate::error::{QuarryError, Result};
use crate::models::TurnRole;
use crate::openai::create_client;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use tracing::{debug, instrument};

const ADJUSTABLE_PARAMS: [&str; 3] = ["temperature", "max_tokens", "max_completion_tokens"];

/// Generator backed by the OpenAI chat completions API.
pub struct OpenAIGenerator {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
}

impl OpenAIGenerator {
    pub fn from_settings(settings: &GenerationSettings) -> Result<Self> {
        Ok(Self {
            client: create_client(settings.timeout_seconds)?,
        })
    }

    fn build_messages(request: &GenerationRequest) -> Result<Vec<ChatCompletionRequestMessage>> {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(request.history.len() + 2);

        messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system_prompt.clone())
                .build()
                .map_err(|e| QuarryError::Generation(e.to_string()))?
                .into(),
        );

        for message in &request.history {
            let built: ChatCompletionRequestMessage = match message.role {
                TurnRole::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(message.content.clone())
                    .build()
                    .map_err(|e| QuarryError::Generation(e.to_string()))?
                    .into(),
                TurnRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(message.content.clone())
                    .build()
                    .map_err(|e| QuarryError::Generation(e.to_string()))?
                    .into(),
            };
            messages.push(built);
        }

        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.user_message.clone())
                .build()
                .map_err(|e| QuarryError::Generation(e.to_string()))?
                .into(),
        );

        Ok(messages)
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    #[instrument(skip(self, request), fields(model = %request.params.model))]
    async fn complete(&self, request: &GenerationRequest) -> Result<String> {
        let params = &request.params;
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&params.model).messages(Self::build_messages(request)?);

        if let Some(temperature) = params.temperature {
            args.temperature(temperature);
        }
        if let Some(limit) = params.max_tokens {
            match params.token_field {
                TokenLimitField::MaxTokens => {
                    #[allow(deprecated)]
                    args.max_tokens(limit);
                }
                TokenLimitField::MaxCompletionTokens => {
                    args.max_completion_tokens(limit);
                }
            }
        }

        let chat_request = args
            .build()
            .map_err(|e| QuarryError::Generation(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(map_api_error)?;

        let answer = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .ok_or_else(|| QuarryError::Generation("Empty response from model".to_string()))?
            .clone();

        debug!("Generated {} characters", answer.len());
        Ok(answer)
    }
}

fn map_api_error(error: OpenAIError) -> QuarryError {
    match error {
        OpenAIError::ApiError(api) => classify_rejection(api.param.as_deref(), &api.message)
            .unwrap_or_else(|| QuarryError::Generation(format!("Chat API error: {}", api.message))),
        other => QuarryError::Generation(format!("Failed to generate response: {}", other)),
    }
}

/// Recognise a rejection of one of the parameters we know how to adjust.
///
/// The provider usually names the parameter in `param`; when it does not,
/// the quoted name in the message is used.
fn classify_rejection(param: Option<&str>, message: &str) -> Option<QuarryError> {
    let param = match param {
        Some(p) if ADJUSTABLE_PARAMS.contains(&p) => p.to_string(),
        Some(_) => return None,
        None => ADJUSTABLE_PARAMS
            .iter()
            .find(|p| message.contains(&format!("'{}'", p)))?
            .to_string(),
    };
    Some(QuarryError::UnsupportedParameter {
        param,
        message: message.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GenerationParams, HistoryMessage};

    #[test]
    fn test_classify_named_param() {
        let err = classify_rejection(Some("temperature"), "Unsupported value").unwrap();
        assert!(matches!(
            err,
            QuarryError::UnsupportedParameter { ref param, .. } if param == "temperature"
        ));
        assert!(classify_rejection(Some("messages"), "bad").is_none());
    }

    #[test]
    fn test_classify_param_from_message() {
        let message = "Unsupported parameter: 'max_tokens' is not supported with this model.";
        let err = classify_rejection(None, message).unwrap();
        assert!(matches!(
            err,
            QuarryError::UnsupportedParameter { ref param, .. } if param == "max_tokens"
        ));
        assert!(classify_rejection(None, "rate limited").is_none());
    }

    #[test]
    fn test_messages_follow_history_order() {
        let request = GenerationRequest {
            system_prompt: "sys".to_string(),
            history: vec![
                HistoryMessage { role: TurnRole::User, content: "hi".to_string() },
                HistoryMessage { role: TurnRole::Assistant, content: "hello".to_string() },
            ],
            user_message: "what now?".to_string(),
            params: GenerationParams::new("m", 0.5, 10),
        };
        let messages = OpenAIGenerator::build_messages(&request).unwrap();
        assert_eq!(messages.len(), 4);
        assert!(matches!(messages[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(messages[2], ChatCompletionRequestMessage::Assistant(_)));
        assert!(matches!(messages[3], ChatCompletionRequestMessage::User(_)));
    }
}
