use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use super::{
    ChunkStream, FinishReason, LlmClient, LlmError, LlmRequest, StreamChunk, ToolCall, Usage,
};

/// In-process client that replays prepared responses, one per call.
///
/// Every request is recorded so tests can assert on the prompt that was sent.
#[derive(Default)]
pub struct ScriptedLlmClient {
    streams: Mutex<VecDeque<Vec<StreamChunk>>>,
    completions: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(self, chunks: Vec<StreamChunk>) -> Self {
        lock(&self.streams).push_back(chunks);
        self
    }

    /// A single step that answers with `text` and stops.
    pub fn with_text_reply(self, text: &str) -> Self {
        self.with_stream(vec![StreamChunk::TextDelta(text.to_string()), finish(FinishReason::Stop)])
    }

    /// A single step that requests `call` and stops for tool handling.
    pub fn with_tool_call(self, call: ToolCall) -> Self {
        self.with_stream(vec![StreamChunk::ToolCall(call), finish(FinishReason::ToolCalls)])
    }

    pub fn with_completion(self, text: &str) -> Self {
        lock(&self.completions).push_back(Ok(text.to_string()));
        self
    }

    pub fn with_failed_completion(self, message: &str) -> Self {
        lock(&self.completions).push_back(Err(message.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        lock(&self.requests).clone()
    }
}

fn finish(reason: FinishReason) -> StreamChunk {
    StreamChunk::Finish { reason, usage: Usage { prompt_tokens: 10, completion_tokens: 5 } }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, request: LlmRequest) -> Result<String, LlmError> {
        lock(&self.requests).push(request);
        match lock(&self.completions).pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(LlmError::Api { status: 503, message }),
            None => Err(LlmError::Api {
                status: 503,
                message: "no scripted completion".to_string(),
            }),
        }
    }

    async fn stream(&self, request: LlmRequest) -> Result<ChunkStream, LlmError> {
        lock(&self.requests).push(request);
        let chunks = lock(&self.streams).pop_front().ok_or_else(|| LlmError::Api {
            status: 503,
            message: "no scripted stream".to_string(),
        })?;
        Ok(stream::iter(chunks.into_iter().map(Ok)).boxed())
    }
}
