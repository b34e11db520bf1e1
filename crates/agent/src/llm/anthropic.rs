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

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    max_retries: u32,
    complete_timeout: Option<Duration>,
}

impl AnthropicClient {
    pub fn new(http: Client, base_url: String, api_key: SecretString, max_retries: u32) -> Self {
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

    fn request(&self, body: &AnthropicRequest) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}/v1/messages", self.base_url))
            .header("Content-Type", "application/json")
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    stream: bool,
}

fn build_request(request: &LlmRequest, stream: bool) -> AnthropicRequest {
    let system = request
        .messages
        .iter()
        .filter_map(|message| match message {
            PromptMessage::System(text) => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>();
    let system = (!system.is_empty()).then(|| system.join("\n\n"));

    // Tool results travel as user turns; consecutive ones are merged into one turn.
    let mut messages: Vec<Value> = Vec::new();
    for message in &request.messages {
        match message {
            PromptMessage::System(_) => {}
            PromptMessage::User(text) => messages.push(json!({ "role": "user", "content": text })),
            PromptMessage::Assistant { text, tool_calls } => {
                let mut content = Vec::new();
                if !text.is_empty() {
                    content.push(json!({ "type": "text", "text": text }));
                }
                for call in tool_calls {
                    content.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.args,
                    }));
                }
                if !content.is_empty() {
                    messages.push(json!({ "role": "assistant", "content": content }));
                }
            }
            PromptMessage::ToolResult { tool_call_id, result, .. } => {
                let block = json!({
                    "type": "tool_result",
                    "tool_use_id": tool_call_id,
                    "content": result.to_string(),
                });
                let merged = messages.last_mut().and_then(|last| {
                    let only_results = |blocks: &Vec<Value>| {
                        blocks.iter().all(|block| block["type"] == "tool_result")
                    };
                    let is_result_turn = last["role"] == "user"
                        && last["content"].as_array().is_some_and(only_results);
                    if is_result_turn {
                        last["content"].as_array_mut()
                    } else {
                        None
                    }
                });
                match merged {
                    Some(blocks) => blocks.push(block),
                    None => messages.push(json!({ "role": "user", "content": [block] })),
                }
            }
        }
    }

    let tools = request
        .tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": tool.parameters,
            })
        })
        .collect();

    AnthropicRequest {
        model: request.model.clone(),
        max_tokens: request.max_tokens,
        messages,
        system,
        tools,
        stream,
    }
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicStreamEvent {
    MessageStart { message: MessageStart },
    ContentBlockStart { index: usize, content_block: ContentBlock },
    ContentBlockDelta { index: usize, delta: BlockDelta },
    ContentBlockStop { index: usize },
    MessageDelta {
        delta: MessageDeltaBody,
        #[serde(default)]
        usage: Option<OutputUsage>,
    },
    MessageStop,
    Error { error: ApiErrorBody },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct MessageStart {
    #[serde(default)]
    usage: Option<InputUsage>,
}

#[derive(Deserialize)]
struct InputUsage {
    #[serde(default)]
    input_tokens: u32,
}

#[derive(Deserialize)]
struct OutputUsage {
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    ToolUse { id: String, name: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct MessageDeltaBody {
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

struct PendingToolUse {
    id: String,
    name: String,
    input_json: String,
}

#[derive(Default)]
pub(crate) struct AnthropicEventParser {
    tool_uses: BTreeMap<usize, PendingToolUse>,
    finish_reason: Option<FinishReason>,
    usage: Usage,
    done: bool,
}

impl AnthropicEventParser {
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

impl EventParser for AnthropicEventParser {
    fn on_data(&mut self, data: &str) -> Result<Vec<StreamChunk>, LlmError> {
        let event: AnthropicStreamEvent =
            serde_json::from_str(data).map_err(|e| LlmError::Parse(format!("stream event: {e}")))?;

        let chunks = match event {
            AnthropicStreamEvent::MessageStart { message } => {
                if let Some(usage) = message.usage {
                    self.usage.prompt_tokens = usage.input_tokens;
                }
                Vec::new()
            }
            AnthropicStreamEvent::ContentBlockStart { index, content_block } => {
                if let ContentBlock::ToolUse { id, name } = content_block {
                    self.tool_uses
                        .insert(index, PendingToolUse { id, name, input_json: String::new() });
                }
                Vec::new()
            }
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                BlockDelta::TextDelta { text } if !text.is_empty() => {
                    vec![StreamChunk::TextDelta(text)]
                }
                BlockDelta::ThinkingDelta { thinking } if !thinking.is_empty() => {
                    vec![StreamChunk::ReasoningDelta(thinking)]
                }
                BlockDelta::InputJsonDelta { partial_json } => {
                    if let Some(pending) = self.tool_uses.get_mut(&index) {
                        pending.input_json.push_str(&partial_json);
                    }
                    Vec::new()
                }
                _ => Vec::new(),
            },
            AnthropicStreamEvent::ContentBlockStop { index } => match self.tool_uses.remove(&index)
            {
                Some(pending) => {
                    let args = if pending.input_json.trim().is_empty() {
                        json!({})
                    } else {
                        serde_json::from_str(&pending.input_json).map_err(|e| {
                            LlmError::Parse(format!("tool_use `{}` input: {e}", pending.name))
                        })?
                    };
                    vec![StreamChunk::ToolCall(ToolCall {
                        id: pending.id,
                        name: pending.name,
                        args,
                    })]
                }
                None => Vec::new(),
            },
            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                if let Some(reason) = delta.stop_reason {
                    self.finish_reason = Some(FinishReason::from_anthropic(&reason));
                }
                if let Some(usage) = usage {
                    self.usage.completion_tokens = usage.output_tokens;
                }
                Vec::new()
            }
            AnthropicStreamEvent::MessageStop => self.finish(),
            AnthropicStreamEvent::Error { error } => {
                return Err(LlmError::Api { status: 500, message: error.message });
            }
            AnthropicStreamEvent::Other => Vec::new(),
        };
        Ok(chunks)
    }

    fn on_end(&mut self) -> Vec<StreamChunk> {
        self.finish()
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: LlmRequest) -> Result<String, LlmError> {
        let body = build_request(&request, false);
        let mut builder = self.request(&body);
        if let Some(timeout) = self.complete_timeout {
            builder = builder.timeout(timeout);
        }
        let response = send_with_retry(builder, self.max_retries).await?;
        let data: AnthropicResponse = response.json().await?;
        Ok(data
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join(""))
    }

    async fn stream(&self, request: LlmRequest) -> Result<ChunkStream, LlmError> {
        let body = build_request(&request, true);
        let response = send_with_retry(self.request(&body), self.max_retries).await?;
        Ok(chunk_stream(response, AnthropicEventParser::default()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{build_request, AnthropicEventParser};
    use crate::llm::sse::EventParser;
    use crate::llm::{FinishReason, LlmRequest, PromptMessage, StreamChunk, ToolCall, Usage};

    fn call(id: &str) -> ToolCall {
        ToolCall { id: id.to_string(), name: "lookup".to_string(), args: json!({}) }
    }

    #[test]
    fn system_prompt_is_lifted_and_tool_results_are_merged() {
        let request = LlmRequest {
            model: "claude-sonnet".to_string(),
            messages: vec![
                PromptMessage::System("You are helpful.".to_string()),
                PromptMessage::User("hi".to_string()),
                PromptMessage::Assistant {
                    text: "checking".to_string(),
                    tool_calls: vec![call("t1"), call("t2")],
                },
                PromptMessage::ToolResult {
                    tool_call_id: "t1".to_string(),
                    tool_name: "lookup".to_string(),
                    result: json!({"ok": 1}),
                },
                PromptMessage::ToolResult {
                    tool_call_id: "t2".to_string(),
                    tool_name: "lookup".to_string(),
                    result: json!({"ok": 2}),
                },
            ],
            tools: Vec::new(),
            max_tokens: 1024,
        };

        let body = serde_json::to_value(build_request(&request, true)).expect("serialize");
        assert_eq!(body["system"], "You are helpful.");
        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["content"][1]["type"], "tool_use");
        assert_eq!(messages[2]["content"].as_array().map(Vec::len), Some(2));
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn parser_streams_text_thinking_and_tool_use() {
        let mut parser = AnthropicEventParser::default();
        let mut chunks = Vec::new();
        for event in [
            r#"{"type":"message_start","message":{"usage":{"input_tokens":30}}}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"thinking"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"hmm"}}"#,
            r#"{"type":"content_block_start","index":1,"content_block":{"type":"text","text":""}}"#,
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"text_delta","text":"Saving."}}"#,
            r#"{"type":"content_block_start","index":2,"content_block":{"type":"tool_use","id":"tu-1","name":"capture_lead","input":{}}}"#,
            r#"{"type":"content_block_delta","index":2,"delta":{"type":"input_json_delta","partial_json":"{\"email\":"}}"#,
            r#"{"type":"content_block_delta","index":2,"delta":{"type":"input_json_delta","partial_json":"\"a@b.co\"}"}}"#,
            r#"{"type":"content_block_stop","index":2}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":9}}"#,
            r#"{"type":"ping"}"#,
            r#"{"type":"message_stop"}"#,
        ] {
            chunks.extend(parser.on_data(event).expect("parse"));
        }

        assert_eq!(
            chunks,
            vec![
                StreamChunk::ReasoningDelta("hmm".to_string()),
                StreamChunk::TextDelta("Saving.".to_string()),
                StreamChunk::ToolCall(ToolCall {
                    id: "tu-1".to_string(),
                    name: "capture_lead".to_string(),
                    args: json!({"email": "a@b.co"}),
                }),
                StreamChunk::Finish {
                    reason: FinishReason::ToolCalls,
                    usage: Usage { prompt_tokens: 30, completion_tokens: 9 },
                },
            ]
        );
        assert!(parser.on_end().is_empty());
    }

    #[test]
    fn error_event_fails_the_stream() {
        let mut parser = AnthropicEventParser::default();
        let result = parser.on_data(r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#);
        assert!(result.is_err());
    }
}
