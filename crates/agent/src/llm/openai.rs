use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::sse::{chunk_stream, EventParser};
use super::{
    send_with_retry, ChunkStream, FinishReason, LlmClient, LlmError, LlmRequest, PromptMessage,
    StreamChunk, ToolCall, Usage,
};

/// Chat-completions client for OpenAI and any server speaking the same API (Ollama).
pub struct OpenAiCompatibleClient {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
    max_retries: u32,
    complete_timeout: Option<Duration>,
}

impl OpenAiCompatibleClient {
    pub fn new(
        http: Client,
        base_url: String,
        api_key: Option<SecretString>,
        max_retries: u32,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            max_retries,
            complete_timeout: None,
        }
    }

    /// Total deadline for non-streamed completions.
    pub fn with_complete_timeout(mut self, timeout: Duration) -> Self {
        self.complete_timeout = Some(timeout);
        self
    }

    fn request(&self, body: &OpenAiRequest) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = &self.api_key {
            if !key.expose_secret().is_empty() {
                builder = builder.bearer_auth(key.expose_secret());
            }
        }
        builder
    }
}

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<Value>,
}

fn build_request(request: &LlmRequest, stream: bool) -> OpenAiRequest {
    let messages = request.messages.iter().map(to_openai_message).collect();
    let tools = request
        .tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                }
            })
        })
        .collect();

    OpenAiRequest {
        model: request.model.clone(),
        messages,
        tools,
        max_tokens: request.max_tokens,
        stream,
        stream_options: stream.then(|| json!({ "include_usage": true })),
    }
}

fn to_openai_message(message: &PromptMessage) -> Value {
    match message {
        PromptMessage::System(content) => json!({ "role": "system", "content": content }),
        PromptMessage::User(content) => json!({ "role": "user", "content": content }),
        PromptMessage::Assistant { text, tool_calls } if tool_calls.is_empty() => {
            json!({ "role": "assistant", "content": text })
        }
        PromptMessage::Assistant { text, tool_calls } => {
            let calls = tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": { "name": call.name, "arguments": call.args.to_string() }
                    })
                })
                .collect::<Vec<_>>();
            let content = if text.is_empty() { Value::Null } else { Value::String(text.clone()) };
            json!({ "role": "assistant", "content": content, "tool_calls": calls })
        }
        PromptMessage::ToolResult { tool_call_id, result, .. } => {
            json!({ "role": "tool", "tool_call_id": tool_call_id, "content": result.to_string() })
        }
    }
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiStreamResponse {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Default, Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
    #[serde(alias = "reasoning")]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OpenAiToolCallDelta>,
}

#[derive(Deserialize)]
struct OpenAiToolCallDelta {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<OpenAiFunctionDelta>,
}

#[derive(Deserialize)]
struct OpenAiFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Tool-call arguments arrive as string fragments keyed by index; they are
/// assembled and released once the choice reports a finish reason.
#[derive(Default)]
pub(crate) struct OpenAiEventParser {
    tool_calls: BTreeMap<usize, PartialToolCall>,
    finish_reason: Option<FinishReason>,
    usage: Usage,
    done: bool,
}

impl OpenAiEventParser {
    fn drain_tool_calls(&mut self) -> Result<Vec<StreamChunk>, LlmError> {
        std::mem::take(&mut self.tool_calls)
            .into_values()
            .map(|partial| {
                let args = if partial.arguments.trim().is_empty() {
                    json!({})
                } else {
                    serde_json::from_str(&partial.arguments).map_err(|e| {
                        LlmError::Parse(format!("tool call `{}` arguments: {e}", partial.name))
                    })?
                };
                Ok(StreamChunk::ToolCall(ToolCall { id: partial.id, name: partial.name, args }))
            })
            .collect()
    }

    fn finish(&mut self) -> Vec<StreamChunk> {
        if self.done {
            return Vec::new();
        }
        self.done = true;
        vec![StreamChunk::Finish {
            reason: self.finish_reason.unwrap_or_default(),
            usage: self.usage,
        }]
    }
}

impl EventParser for OpenAiEventParser {
    fn on_data(&mut self, data: &str) -> Result<Vec<StreamChunk>, LlmError> {
        if data == "[DONE]" {
            let mut chunks = self.drain_tool_calls()?;
            chunks.extend(self.finish());
            return Ok(chunks);
        }

        let parsed: OpenAiStreamResponse =
            serde_json::from_str(data).map_err(|e| LlmError::Parse(format!("stream event: {e}")))?;
        if let Some(usage) = parsed.usage {
            self.usage = Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
            };
        }

        let mut chunks = Vec::new();
        for choice in parsed.choices {
            if let Some(reasoning) = choice.delta.reasoning_content.filter(|r| !r.is_empty()) {
                chunks.push(StreamChunk::ReasoningDelta(reasoning));
            }
            if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                chunks.push(StreamChunk::TextDelta(content));
            }
            for delta in choice.delta.tool_calls {
                let entry = self.tool_calls.entry(delta.index).or_default();
                if let Some(id) = delta.id {
                    entry.id = id;
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        entry.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        entry.arguments.push_str(&arguments);
                    }
                }
            }
            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(FinishReason::from_openai(&reason));
                chunks.extend(self.drain_tool_calls()?);
            }
        }
        Ok(chunks)
    }

    fn on_end(&mut self) -> Vec<StreamChunk> {
        let mut chunks = self.drain_tool_calls().unwrap_or_default();
        chunks.extend(self.finish());
        chunks
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, request: LlmRequest) -> Result<String, LlmError> {
        let body = build_request(&request, false);
        let mut builder = self.request(&body);
        if let Some(timeout) = self.complete_timeout {
            builder = builder.timeout(timeout);
        }
        let response = send_with_retry(builder, self.max_retries).await?;
        let data: OpenAiResponse = response.json().await?;
        Ok(data.choices.into_iter().next().and_then(|c| c.message.content).unwrap_or_default())
    }

    async fn stream(&self, request: LlmRequest) -> Result<ChunkStream, LlmError> {
        let body = build_request(&request, true);
        let response = send_with_retry(self.request(&body), self.max_retries).await?;
        Ok(chunk_stream(response, OpenAiEventParser::default()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{build_request, OpenAiEventParser};
    use crate::llm::sse::EventParser;
    use crate::llm::{
        FinishReason, LlmRequest, PromptMessage, StreamChunk, ToolCall, ToolDefinition, Usage,
    };

    #[test]
    fn request_renders_tool_calls_and_results() {
        let request = LlmRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![
                PromptMessage::System("be brief".to_string()),
                PromptMessage::Assistant {
                    text: String::new(),
                    tool_calls: vec![ToolCall {
                        id: "call-1".to_string(),
                        name: "capture_lead".to_string(),
                        args: json!({"name": "Ana"}),
                    }],
                },
                PromptMessage::ToolResult {
                    tool_call_id: "call-1".to_string(),
                    tool_name: "capture_lead".to_string(),
                    result: json!({"leadId": "l1"}),
                },
            ],
            tools: vec![ToolDefinition {
                name: "capture_lead".to_string(),
                description: "Save a lead".to_string(),
                parameters: json!({"type": "object"}),
            }],
            max_tokens: 256,
        };

        let body = serde_json::to_value(build_request(&request, true)).expect("serialize");
        assert_eq!(body["messages"][1]["content"], serde_json::Value::Null);
        let arguments = &body["messages"][1]["tool_calls"][0]["function"]["arguments"];
        assert_eq!(arguments, "{\"name\":\"Ana\"}");
        assert_eq!(body["messages"][2]["role"], "tool");
        assert_eq!(body["tools"][0]["function"]["name"], "capture_lead");
        assert_eq!(body["stream_options"]["include_usage"], true);
    }

    #[test]
    fn parser_assembles_fragmented_tool_calls() {
        let mut parser = OpenAiEventParser::default();
        let mut chunks = Vec::new();
        for event in [
            r#"{"choices":[{"delta":{"content":"Let me save that."}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call-1","function":{"name":"capture_lead","arguments":"{\"na"}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"me\":\"Ana\"}"}}]}}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
            r#"{"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":7}}"#,
            "[DONE]",
        ] {
            chunks.extend(parser.on_data(event).expect("parse"));
        }
        chunks.extend(parser.on_end());

        assert_eq!(
            chunks,
            vec![
                StreamChunk::TextDelta("Let me save that.".to_string()),
                StreamChunk::ToolCall(ToolCall {
                    id: "call-1".to_string(),
                    name: "capture_lead".to_string(),
                    args: json!({"name": "Ana"}),
                }),
                StreamChunk::Finish {
                    reason: FinishReason::ToolCalls,
                    usage: Usage { prompt_tokens: 12, completion_tokens: 7 },
                },
            ]
        );
    }

    #[test]
    fn parser_emits_reasoning_and_finishes_without_done_marker() {
        let mut parser = OpenAiEventParser::default();
        let chunks = parser
            .on_data(r#"{"choices":[{"delta":{"reasoning_content":"thinking"},"finish_reason":"stop"}]}"#)
            .expect("parse");
        assert_eq!(chunks, vec![StreamChunk::ReasoningDelta("thinking".to_string())]);

        let tail = parser.on_end();
        assert!(matches!(
            tail.as_slice(),
            [StreamChunk::Finish { reason: FinishReason::Stop, .. }]
        ));
        assert!(parser.on_end().is_empty());
    }
}
