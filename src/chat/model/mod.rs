
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::OpenAiConfig;
use crate::http::HttpClient;

const CHAT_COMPLETIONS_PATH: &str = "v1/chat/completions";

/// One message of a chat completion request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Generates a reply for a message list. Implementations perform blocking
/// I/O and are driven from tokio's blocking pool.
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for the hosted `/v1/chat/completions` endpoint
#[derive(Debug, Clone)]
pub struct OpenAiChatModel {
    http: HttpClient,
    model: String,
}

impl OpenAiChatModel {
    /// Requires `config.api_key` to be set
    #[inline]
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .context("OPENAI_API_KEY is required for the chat model")?;

        let http = HttpClient::new(&config.base_url)?
            .with_timeout(Duration::from_secs(config.timeout_secs))
            .with_bearer_token(api_key);

        Ok(Self {
            http,
            model: config.chat_model.clone(),
        })
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.http = self.http.with_retry_attempts(attempts);
        self
    }

    #[inline]
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.http = self.http.with_backoff_unit(unit);
        self
    }
}

impl ChatModel for OpenAiChatModel {
    #[inline]
    fn model_name(&self) -> &str {
        &self.model
    }

    #[inline]
    fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        debug!(
            "Requesting chat completion from {} with {} messages",
            self.model,
            messages.len()
        );

        let request = CompletionRequest {
            model: &self.model,
            messages,
        };
        let response: CompletionResponse = self
            .http
            .post_json(CHAT_COMPLETIONS_PATH, &request)
            .context("Chat completion request failed")?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .context("Chat completion response contained no message content")
    }
}
