//! Line-oriented data stream consumed by the chat UI.
//!
//! Each part is written as `<code>:<json>\n`. The response carries the
//! `x-vercel-ai-data-stream: v1` header so the client picks the right decoder.

use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::llm::{FinishReason, Usage};

pub const DATA_STREAM_HEADER: &str = "x-vercel-ai-data-stream";
pub const DATA_STREAM_VERSION: &str = "v1";
pub const DATA_STREAM_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

#[derive(Clone, Debug, PartialEq)]
pub enum StreamPart {
    Text(String),
    Reasoning(String),
    ToolCall { tool_call_id: String, tool_name: String, args: Value },
    ToolResult { tool_call_id: String, result: Value },
    StartStep { message_id: String },
    FinishStep { finish_reason: FinishReason, usage: Usage, is_continued: bool },
    FinishMessage { finish_reason: FinishReason, usage: Usage },
    Error(String),
}

impl StreamPart {
    pub fn code(&self) -> char {
        match self {
            Self::Text(_) => '0',
            Self::Reasoning(_) => 'g',
            Self::ToolCall { .. } => '9',
            Self::ToolResult { .. } => 'a',
            Self::StartStep { .. } => 'f',
            Self::FinishStep { .. } => 'e',
            Self::FinishMessage { .. } => 'd',
            Self::Error(_) => '3',
        }
    }

    fn payload(&self) -> Value {
        match self {
            Self::Text(text) | Self::Reasoning(text) | Self::Error(text) => json!(text),
            Self::ToolCall { tool_call_id, tool_name, args } => {
                json!({ "toolCallId": tool_call_id, "toolName": tool_name, "args": args })
            }
            Self::ToolResult { tool_call_id, result } => {
                json!({ "toolCallId": tool_call_id, "result": result })
            }
            Self::StartStep { message_id } => json!({ "messageId": message_id }),
            Self::FinishStep { finish_reason, usage, is_continued } => json!({
                "finishReason": finish_reason,
                "usage": usage,
                "isContinued": is_continued,
            }),
            Self::FinishMessage { finish_reason, usage } => {
                json!({ "finishReason": finish_reason, "usage": usage })
            }
        }
    }

    pub fn encode(&self) -> String {
        format!("{}:{}\n", self.code(), self.payload())
    }
}

/// The receiving half went away; the client disconnected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("data stream closed by the client")]
pub struct StreamClosed;

#[derive(Clone, Debug)]
pub struct DataStreamWriter {
    tx: mpsc::Sender<String>,
}

/// Bounded so a slow client applies backpressure to generation.
pub fn channel(capacity: usize) -> (DataStreamWriter, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (DataStreamWriter { tx }, rx)
}

impl DataStreamWriter {
    pub async fn send(&self, part: StreamPart) -> Result<(), StreamClosed> {
        self.tx.send(part.encode()).await.map_err(|_| StreamClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
