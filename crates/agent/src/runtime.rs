use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;

use gingga_core::config::ChatConfig;
use gingga_core::domain::agent::Agent;
use gingga_core::domain::chat::ChatId;
use gingga_core::domain::message::{
    execution_failure_result, ChatMessage, MessageId, MessagePart, Role, ToolInvocation,
};
use gingga_db::repositories::{MessageRepository, RepositoryError};

use crate::approval::reconcile_tool_approvals;
use crate::llm::{FinishReason, LlmClient, LlmError, LlmRequest, StreamChunk, ToolCall, Usage};
use crate::prompt::{build_messages, system_prompt};
use crate::stream::{DataStreamWriter, StreamClosed, StreamPart};
use crate::tools::{ToolContext, ToolRegistry};

pub const GENERATION_ERROR_MESSAGE: &str = "An error occurred while generating the response.";

/// One chat turn, with the chat's stored history ending in the inbound message.
#[derive(Clone, Debug)]
pub struct Turn {
    pub chat_id: ChatId,
    pub agent: Option<Agent>,
    pub model: String,
    pub history: Vec<ChatMessage>,
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TurnOutcome {
    Completed { message_id: MessageId, steps: u32, usage: Usage, finish_reason: FinishReason },
    /// The client disconnected; nothing was persisted for the assistant reply.
    Cancelled { steps: u32 },
    Failed { reason: String },
}

#[derive(Debug, thiserror::Error)]
enum TurnError {
    #[error(transparent)]
    Closed(#[from] StreamClosed),
    #[error("provider error: {0}")]
    Llm(#[from] LlmError),
    #[error("persistence error: {0}")]
    Persistence(#[from] RepositoryError),
}

pub struct ChatRuntime {
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    messages: Arc<dyn MessageRepository>,
    system_prompt: String,
    max_steps: u32,
    max_tokens: u32,
}

struct Progress {
    message_id: MessageId,
    parts: Vec<MessagePart>,
    steps: u32,
    usage: Usage,
    finish_reason: FinishReason,
}

impl ChatRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: Arc<ToolRegistry>,
        messages: Arc<dyn MessageRepository>,
        config: &ChatConfig,
        max_tokens: u32,
    ) -> Self {
        Self {
            llm,
            tools,
            messages,
            system_prompt: config.system_prompt.clone(),
            max_steps: config.max_steps.max(1),
            max_tokens,
        }
    }

    pub fn llm(&self) -> Arc<dyn LlmClient> {
        self.llm.clone()
    }

    /// Runs the turn to completion, writing every part to `writer`.
    ///
    /// The assistant message is persisted only when the stream finished normally.
    pub async fn run(&self, turn: Turn, writer: DataStreamWriter) -> TurnOutcome {
        let mut progress = Progress {
            message_id: MessageId(uuid::Uuid::new_v4().to_string()),
            parts: Vec::new(),
            steps: 0,
            usage: Usage::default(),
            finish_reason: FinishReason::Unknown,
        };

        let result = self.drive(&turn, &writer, &mut progress).await;
        let outcome = match result {
            Ok(()) => TurnOutcome::Completed {
                message_id: progress.message_id.clone(),
                steps: progress.steps,
                usage: progress.usage,
                finish_reason: progress.finish_reason,
            },
            Err(TurnError::Closed(_)) => TurnOutcome::Cancelled { steps: progress.steps },
            Err(error) => {
                tracing::error!(
                    event_name = "agent.turn.error",
                    correlation_id = %turn.correlation_id,
                    chat_id = %turn.chat_id.0,
                    error = %error,
                    "chat turn failed"
                );
                let _ = writer.send(StreamPart::Error(GENERATION_ERROR_MESSAGE.to_string())).await;
                TurnOutcome::Failed { reason: error.to_string() }
            }
        };

        match &outcome {
            TurnOutcome::Completed { steps, usage, .. } => tracing::info!(
                event_name = "agent.turn.completed",
                correlation_id = %turn.correlation_id,
                chat_id = %turn.chat_id.0,
                message_id = %progress.message_id.0,
                steps,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "chat turn completed"
            ),
            TurnOutcome::Cancelled { steps } => tracing::info!(
                event_name = "agent.turn.cancelled",
                correlation_id = %turn.correlation_id,
                chat_id = %turn.chat_id.0,
                steps,
                "client disconnected; assistant message not persisted"
            ),
            TurnOutcome::Failed { .. } => {}
        }
        outcome
    }

    async fn drive(
        &self,
        turn: &Turn,
        writer: &DataStreamWriter,
        progress: &mut Progress,
    ) -> Result<(), TurnError> {
        let mut history = turn.history.clone();
        let base_context = ToolContext {
            chat_id: turn.chat_id.clone(),
            agent: turn.agent.clone(),
            history: history.clone(),
            correlation_id: turn.correlation_id.clone(),
        };

        if let Some(last) = history.pop() {
            let last = if last.role == Role::Assistant {
                let reconciled = reconcile_tool_approvals(
                    last,
                    &self.tools,
                    &base_context,
                    self.messages.as_ref(),
                    writer,
                )
                .await?;
                reconciled.message
            } else {
                last
            };
            history.push(last);
        }

        let system = system_prompt(&self.system_prompt, turn.agent.as_ref());

        for step in 0..self.max_steps {
            if step > 0 {
                progress.parts.push(MessagePart::StepStart);
            }
            writer.send(StreamPart::StartStep { message_id: progress.message_id.0.clone() }).await?;

            let mut prompt_history = history.clone();
            if !progress.parts.is_empty() {
                prompt_history.push(self.assistant_message(turn, progress));
            }
            let request = LlmRequest {
                model: turn.model.clone(),
                messages: build_messages(&system, &prompt_history),
                tools: self.tools.definitions(),
                max_tokens: self.max_tokens,
            };

            let mut stream = self.llm.stream(request).await?;
            let mut calls: Vec<ToolCall> = Vec::new();
            let mut step_usage = Usage::default();
            let mut step_reason = FinishReason::Unknown;

            while let Some(chunk) = stream.next().await {
                if writer.is_closed() {
                    return Err(StreamClosed.into());
                }
                match chunk? {
                    StreamChunk::TextDelta(delta) => {
                        writer.send(StreamPart::Text(delta.clone())).await?;
                        append_text(&mut progress.parts, &delta);
                    }
                    StreamChunk::ReasoningDelta(delta) => {
                        writer.send(StreamPart::Reasoning(delta.clone())).await?;
                        append_reasoning(&mut progress.parts, &delta);
                    }
                    StreamChunk::ToolCall(call) => {
                        writer
                            .send(StreamPart::ToolCall {
                                tool_call_id: call.id.clone(),
                                tool_name: call.name.clone(),
                                args: call.args.clone(),
                            })
                            .await?;
                        let mut invocation =
                            ToolInvocation::call(&call.id, &call.name, call.args.clone());
                        invocation.step = Some(step);
                        progress
                            .parts
                            .push(MessagePart::ToolInvocation { tool_invocation: invocation });
                        calls.push(call);
                    }
                    StreamChunk::Finish { reason, usage } => {
                        step_reason = reason;
                        step_usage = usage;
                    }
                }
            }
            drop(stream);

            progress.steps = step + 1;
            progress.usage.add(step_usage);
            progress.finish_reason = step_reason;

            let mut awaiting_approval = false;
            let mut executed = false;
            let context = ToolContext { history: history.clone(), ..base_context.clone() };
            for call in &calls {
                let result = match self.tools.get(&call.name) {
                    Some(tool) if tool.requires_approval() => {
                        awaiting_approval = true;
                        continue;
                    }
                    Some(tool) => match tool.execute(call.args.clone(), &context).await {
                        Ok(result) => result,
                        Err(error) => {
                            tracing::warn!(
                                event_name = "agent.tool.failed",
                                correlation_id = %turn.correlation_id,
                                tool_name = %call.name,
                                error = %error,
                                "tool execution failed"
                            );
                            execution_failure_result(&error.to_string())
                        }
                    },
                    None => execution_failure_result(&format!("unknown tool `{}`", call.name)),
                };
                executed = true;
                set_tool_result(&mut progress.parts, &call.id, result.clone());
                writer
                    .send(StreamPart::ToolResult { tool_call_id: call.id.clone(), result })
                    .await?;
            }

            let is_continued = executed && !awaiting_approval && step + 1 < self.max_steps;
            writer
                .send(StreamPart::FinishStep {
                    finish_reason: step_reason,
                    usage: step_usage,
                    is_continued,
                })
                .await?;
            if !is_continued {
                break;
            }
        }

        writer
            .send(StreamPart::FinishMessage {
                finish_reason: progress.finish_reason,
                usage: progress.usage,
            })
            .await?;

        if !progress.parts.is_empty() {
            self.messages.upsert(self.assistant_message(turn, progress)).await?;
        }
        Ok(())
    }

    fn assistant_message(&self, turn: &Turn, progress: &Progress) -> ChatMessage {
        ChatMessage {
            id: progress.message_id.clone(),
            chat_id: turn.chat_id.clone(),
            role: Role::Assistant,
            parts: progress.parts.clone(),
            attachments: Vec::new(),
            model: Some(turn.model.clone()),
            created_at: Utc::now(),
        }
    }
}

fn append_text(parts: &mut Vec<MessagePart>, delta: &str) {
    match parts.last_mut() {
        Some(MessagePart::Text { text }) => text.push_str(delta),
        _ => parts.push(MessagePart::text(delta)),
    }
}

fn append_reasoning(parts: &mut Vec<MessagePart>, delta: &str) {
    match parts.last_mut() {
        Some(MessagePart::Reasoning { reasoning }) => reasoning.push_str(delta),
        _ => parts.push(MessagePart::Reasoning { reasoning: delta.to_string() }),
    }
}

fn set_tool_result(parts: &mut [MessagePart], tool_call_id: &str, result: serde_json::Value) {
    for part in parts.iter_mut() {
        if let MessagePart::ToolInvocation { tool_invocation } = part {
            if tool_invocation.tool_call_id == tool_call_id {
                *tool_invocation = tool_invocation.clone().with_result(result);
                return;
            }
        }
    }
}
