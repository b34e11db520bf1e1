use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use gingga_core::config::{LlmConfig, LlmProvider};

pub mod anthropic;
pub mod openai;
pub mod scripted;
mod sse;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiCompatibleClient;
pub use scripted::ScriptedLlmClient;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PromptMessage {
    System(String),
    User(String),
    Assistant { text: String, tool_calls: Vec<ToolCall> },
    ToolResult { tool_call_id: String, tool_name: String, result: Value },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<PromptMessage>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl Usage {
    pub fn add(&mut self, other: Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
    #[default]
    Unknown,
}

impl FinishReason {
    pub fn from_openai(raw: &str) -> Self {
        match raw {
            "stop" => Self::Stop,
            "length" => Self::Length,
            "tool_calls" | "function_call" => Self::ToolCalls,
            "content_filter" => Self::ContentFilter,
            _ => Self::Unknown,
        }
    }

    pub fn from_anthropic(raw: &str) -> Self {
        match raw {
            "end_turn" | "stop_sequence" => Self::Stop,
            "max_tokens" => Self::Length,
            "tool_use" => Self::ToolCalls,
            "refusal" => Self::ContentFilter,
            _ => Self::Unknown,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StreamChunk {
    TextDelta(String),
    ReasoningDelta(String),
    ToolCall(ToolCall),
    Finish { reason: FinishReason, usage: Usage },
}

pub type ChunkStream = BoxStream<'static, Result<StreamChunk, LlmError>>;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Single non-streamed answer, used for short side tasks such as titles.
    async fn complete(&self, request: LlmRequest) -> Result<String, LlmError>;
    async fn stream(&self, request: LlmRequest) -> Result<ChunkStream, LlmError>;
}

/// `llm.timeout_secs` bounds connecting and the idle gap between streamed chunks;
/// a streamed reply as a whole may run longer. Non-streamed completions keep it
/// as a total deadline.
pub fn build_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let http = reqwest::Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()
        .map_err(|e| LlmError::Configuration(format!("http client: {e}")))?;

    let client: Arc<dyn LlmClient> = match config.provider {
        LlmProvider::OpenAi => Arc::new(
            OpenAiCompatibleClient::new(
                http,
                config.base_url.clone().unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
                config.api_key.clone(),
                config.max_retries,
            )
            .with_complete_timeout(timeout),
        ),
        LlmProvider::Ollama => {
            let host =
                config.base_url.clone().unwrap_or_else(|| "http://localhost:11434".to_string());
            Arc::new(
                OpenAiCompatibleClient::new(
                    http,
                    ollama_api_base(&host),
                    config.api_key.clone(),
                    config.max_retries,
                )
                .with_complete_timeout(timeout),
            )
        }
        LlmProvider::Anthropic => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                LlmError::Configuration("llm.api_key is required for anthropic".to_string())
            })?;
            Arc::new(
                AnthropicClient::new(
                    http,
                    config
                        .base_url
                        .clone()
                        .unwrap_or_else(|| "https://api.anthropic.com".to_string()),
                    api_key,
                    config.max_retries,
                )
                .with_complete_timeout(timeout),
            )
        }
    };
    Ok(client)
}

/// Ollama serves the OpenAI-compatible API under `/v1`.
fn ollama_api_base(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.ends_with("/v1") {
        host.to_string()
    } else {
        format!("{host}/v1")
    }
}

/// Sends the request, retrying connection-level failures up to `max_retries` times.
pub(crate) async fn send_with_retry(
    builder: reqwest::RequestBuilder,
    max_retries: u32,
) -> Result<reqwest::Response, LlmError> {
    let mut attempt = 0;
    loop {
        let request = builder
            .try_clone()
            .ok_or_else(|| LlmError::Configuration("request body is not cloneable".to_string()))?;
        match request.send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status().as_u16();
                let message = response.text().await.unwrap_or_default();
                return Err(LlmError::Api { status, message });
            }
            Err(error) if (error.is_connect() || error.is_timeout()) && attempt < max_retries => {
                attempt += 1;
                tracing::warn!(
                    event_name = "llm.request.retry",
                    attempt,
                    error = %error,
                    "retrying provider request"
                );
                tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt))).await;
            }
            Err(error) => return Err(LlmError::Http(error)),
        }
    }
}
