//! Applies the user's approve/deny answers to pending tool invocations.
//!
//! The client records its decision by writing a sentinel string as the tool
//! result. Approved calls run their executor; denied ones get a fixed error
//! result. Either way the outcome is streamed to the client right away and the
//! rewritten message is persisted once.

use serde_json::Value;

use gingga_core::domain::message::{
    denial_result, execution_failure_result, ApprovalDecision, ChatMessage, MessagePart,
    ToolInvocation,
};
use gingga_db::repositories::{MessageRepository, RepositoryError};

use crate::stream::{DataStreamWriter, StreamPart};
use crate::tools::{ToolContext, ToolRegistry};

#[derive(Clone, Debug, PartialEq)]
pub struct Reconciliation {
    pub message: ChatMessage,
    pub executed: usize,
    pub denied: usize,
    pub failed: usize,
    /// Invocations already answered in storage whose stored result was reused.
    pub replayed: usize,
    pub persisted: bool,
}

pub async fn reconcile_tool_approvals(
    message: ChatMessage,
    registry: &ToolRegistry,
    context: &ToolContext,
    messages: &dyn MessageRepository,
    writer: &DataStreamWriter,
) -> Result<Reconciliation, RepositoryError> {
    let mut outcome = Reconciliation {
        message,
        executed: 0,
        denied: 0,
        failed: 0,
        replayed: 0,
        persisted: false,
    };

    let has_decisions = outcome.message.tool_invocations().any(|invocation| {
        invocation.approval_decision().is_some() && registry.get(&invocation.tool_name).is_some()
    });
    if !has_decisions {
        return Ok(outcome);
    }

    let stored = messages.find_by_id(&outcome.message.id).await?;
    // Message ids are global; a copy stored under another chat is never read or overwritten.
    if let Some(foreign) = stored.as_ref().filter(|s| s.chat_id != outcome.message.chat_id) {
        tracing::warn!(
            event_name = "agent.approval.foreign_message",
            correlation_id = %context.correlation_id,
            chat_id = %context.chat_id.0,
            message_id = %foreign.id.0,
            "message id belongs to another chat; decisions ignored"
        );
        return Ok(outcome);
    }
    let mut changed = false;

    for part in outcome.message.parts.iter_mut() {
        let MessagePart::ToolInvocation { tool_invocation } = part else {
            continue;
        };
        let Some(decision) = tool_invocation.approval_decision() else {
            continue;
        };
        let Some(tool) = registry.get(&tool_invocation.tool_name) else {
            continue;
        };

        let previous =
            stored.as_ref().and_then(|s| terminal_copy(s, &tool_invocation.tool_call_id));
        if let Some(previous) = previous {
            tracing::info!(
                event_name = "agent.approval.replayed",
                correlation_id = %context.correlation_id,
                chat_id = %context.chat_id.0,
                tool_call_id = %tool_invocation.tool_call_id,
                "tool call already answered; reusing stored result"
            );
            *tool_invocation = previous;
            outcome.replayed += 1;
            emit_result(writer, tool_invocation).await;
            continue;
        }

        let result: Value = match decision {
            ApprovalDecision::Denied => {
                outcome.denied += 1;
                denial_result()
            }
            ApprovalDecision::Approved => {
                match tool.execute(tool_invocation.args.clone(), context).await {
                    Ok(result) => {
                        outcome.executed += 1;
                        result
                    }
                    Err(error) => {
                        tracing::warn!(
                            event_name = "agent.approval.tool_failed",
                            correlation_id = %context.correlation_id,
                            chat_id = %context.chat_id.0,
                            tool_name = %tool_invocation.tool_name,
                            error = %error,
                            "approved tool failed"
                        );
                        outcome.failed += 1;
                        execution_failure_result(&error.to_string())
                    }
                }
            }
        };

        tool_invocation.result = Some(result);
        changed = true;
        emit_result(writer, tool_invocation).await;
    }

    if changed {
        messages.upsert(outcome.message.clone()).await?;
        outcome.persisted = true;
    }

    tracing::info!(
        event_name = "agent.approval.reconciled",
        correlation_id = %context.correlation_id,
        chat_id = %context.chat_id.0,
        executed = outcome.executed,
        denied = outcome.denied,
        failed = outcome.failed,
        replayed = outcome.replayed,
        persisted = outcome.persisted,
        "tool approvals reconciled"
    );
    Ok(outcome)
}

fn terminal_copy(stored: &ChatMessage, tool_call_id: &str) -> Option<ToolInvocation> {
    stored
        .tool_invocations()
        .find(|invocation| {
            invocation.tool_call_id == tool_call_id && invocation.has_terminal_result()
        })
        .cloned()
}

/// A closed stream does not stop reconciliation; results still get persisted.
async fn emit_result(writer: &DataStreamWriter, invocation: &ToolInvocation) {
    let Some(result) = invocation.result.clone() else {
        return;
    };
    let part = StreamPart::ToolResult { tool_call_id: invocation.tool_call_id.clone(), result };
    if writer.send(part).await.is_err() {
        tracing::debug!(
            event_name = "agent.approval.stream_closed",
            tool_call_id = %invocation.tool_call_id,
            "client went away before the tool result was sent"
        );
    }
}
