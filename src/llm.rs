use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request failed: {0}")] Request(String),
    #[error("timed out after {0:?}")] Timeout(Duration),
    #[error("status={status} body={body}")] Status { status: u16, body: String },
    #[error("unexpected response: {0}")] Envelope(String),
}

/// Everything one outbound call needs. Built per request, nothing is shared
/// between calls.
#[derive(Debug, Clone)]
pub struct CallOptions {
    pub api_key: String,
    pub model: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Single attempt, no retries. Returns the assistant message text.
    async fn complete(&self, prompt: &str, options: &CallOptions) -> Result<String, LlmError>;
}

/// OpenAI-compatible `/chat/completions` client (Together, OpenRouter, ...).
pub struct ChatCompletionClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl ChatCompletionClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: Client::new(), base_url: base_url.into() }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionProvider for ChatCompletionClient {
    async fn complete(&self, prompt: &str, options: &CallOptions) -> Result<String, LlmError> {
        let url = self.endpoint();
        let body = ChatRequest {
            model: &options.model,
            messages: [
                ChatMessage { role: "system", content: &options.system_prompt },
                ChatMessage { role: "user", content: prompt },
            ],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        info!("🔗 Calling {} with model {}", url, options.model);

        let response = self.client
            .post(&url)
            .bearer_auth(&options.api_key)
            .timeout(options.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() { LlmError::Timeout(options.timeout) } else { LlmError::Request(e.to_string()) }
            })?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!("❌ Model API error response: {}", error_body);
            return Err(LlmError::Status { status: status.as_u16(), body: error_body });
        }

        let response_text = response.text().await.map_err(|e| {
            if e.is_timeout() { LlmError::Timeout(options.timeout) } else { LlmError::Request(e.to_string()) }
        })?;
        let parsed: ChatResponse = serde_json::from_str(&response_text)
            .map_err(|e| LlmError::Envelope(format!("parse error: {}", e)))?;

        extract_first_message(parsed)
            .ok_or_else(|| LlmError::Envelope("no message content in response".into()))
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice { #[serde(default)] message: Option<AssistantMessage> }

#[derive(Debug, Deserialize)]
struct AssistantMessage { #[serde(default)] content: Option<String> }

fn extract_first_message(resp: ChatResponse) -> Option<String> {
    resp.choices
        .into_iter()
        .find_map(|c| c.message.and_then(|m| m.content))
}
