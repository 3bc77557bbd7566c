//! OpenAI-compatible LLM client.
//!
//! This client works with any OpenAI-compatible API endpoint. Every call
//! retries internally with a short pause between attempts; callers see a
//! single `Result`.

use crate::config::LlmConfig;
use crate::error::{ExtractError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Retry attempts before a call is reported as failed.
const MAX_RETRIES: u32 = 10;

/// Pause between retry attempts.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Message role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The model completed its answer.
    Finished,
    /// The model hit the output-token ceiling mid-answer.
    MaxOutputReached,
}

impl FinishReason {
    fn from_api(reason: Option<&str>) -> Self {
        match reason {
            Some("length") => FinishReason::MaxOutputReached,
            _ => FinishReason::Finished,
        }
    }
}

/// Request body for chat completion.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Response from chat completion.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// OpenAI API error response.
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Response from an LLM call including metadata.
#[derive(Debug)]
pub struct LlmResponse {
    /// The generated content.
    pub content: String,
    /// Reason the model stopped generating.
    pub finish_reason: FinishReason,
}

/// OpenAI-compatible LLM client.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

impl LlmClient {
    /// Create a new LLM client with the given configuration.
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Get the API endpoint URL.
    fn endpoint(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        format!("{}/v1/chat/completions", base)
    }

    /// Send a chat completion request, retrying on transport or API errors.
    pub async fn chat(&self, messages: Vec<Message>) -> Result<LlmResponse> {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match self.chat_once(&messages).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(attempt, error = %e, "LLM call failed, retrying");
                    last_error = Some(e);
                    if attempt < MAX_RETRIES {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }

        Err(ExtractError::LlmApi(format!(
            "retries exhausted after {} attempts: {}",
            MAX_RETRIES,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    async fn chat_once(&self, messages: &[Message]) -> Result<LlmResponse> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: messages.to_vec(),
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // Try to parse as API error
            if let Ok(api_error) = serde_json::from_str::<ApiError>(&body) {
                return Err(ExtractError::LlmApi(format!(
                    "API error ({}): {}",
                    status, api_error.error.message
                )));
            }
            return Err(ExtractError::LlmApi(format!(
                "Request failed ({}): {}",
                status, body
            )));
        }

        let completion: ChatCompletionResponse = serde_json::from_str(&body)?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ExtractError::LlmApi("No choices in response".to_string()))?;

        Ok(LlmResponse {
            content: choice.message.content,
            finish_reason: FinishReason::from_api(choice.finish_reason.as_deref()),
        })
    }

    /// Convenience method: single user message with optional system prompt.
    pub async fn complete(&self, system: Option<&str>, user: &str) -> Result<String> {
        let response = self.chat(Self::build_messages(system, user)).await?;
        Ok(response.content)
    }

    /// Like [`complete`](Self::complete), but also reports how the model
    /// stopped so callers can continue truncated output.
    pub async fn complete_with_finish(
        &self,
        system: Option<&str>,
        user: &str,
    ) -> Result<(String, FinishReason)> {
        let response = self.chat(Self::build_messages(system, user)).await?;
        Ok((response.content, response.finish_reason))
    }

    /// Continue an existing conversation with one more user turn.
    pub async fn continue_chat(
        &self,
        mut chat_history: Vec<Message>,
        user: &str,
    ) -> Result<(String, FinishReason)> {
        chat_history.push(Message::user(user));
        let response = self.chat(chat_history).await?;
        Ok((response.content, response.finish_reason))
    }

    fn build_messages(system: Option<&str>, user: &str) -> Vec<Message> {
        let mut messages = Vec::new();
        if let Some(sys) = system {
            messages.push(Message::system(sys));
        }
        messages.push(Message::user(user));
        messages
    }

    /// Test connectivity to the API.
    pub async fn test_connection(&self) -> Result<()> {
        let messages = vec![Message::user("Say 'hello' and nothing else.")];

        let response = self.chat(messages).await?;

        if response.content.to_lowercase().contains("hello") {
            Ok(())
        } else {
            Err(ExtractError::LlmApi(format!(
                "Unexpected response: {}",
                response.content
            )))
        }
    }
}
