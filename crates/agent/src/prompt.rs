use gingga_core::domain::agent::Agent;
use gingga_core::domain::message::{ChatMessage, MessagePart, Role, ToolInvocationState};

use crate::llm::{PromptMessage, ToolCall};

/// System prompt for one turn: the service prompt followed by the agent's own instructions.
pub fn system_prompt(base: &str, agent: Option<&Agent>) -> String {
    let mut prompt = base.trim().to_string();
    if let Some(agent) = agent {
        prompt.push_str(&format!("\n\nYou are acting as \"{}\".", agent.name));
        if !agent.description.trim().is_empty() {
            prompt.push_str(&format!(" {}", agent.description.trim()));
        }
        if !agent.instructions.trim().is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(agent.instructions.trim());
        }
    }
    prompt
}

/// Converts stored history into provider messages.
///
/// Tool calls are only replayed when they carry a result; providers reject a
/// call without its answer. Reasoning, sources and step markers stay client-side.
pub fn build_messages(system: &str, history: &[ChatMessage]) -> Vec<PromptMessage> {
    let mut messages = vec![PromptMessage::System(system.to_string())];
    for message in history {
        match message.role {
            Role::System => messages.push(PromptMessage::System(message.text())),
            Role::User => messages.push(PromptMessage::User(user_content(message))),
            Role::Assistant => push_assistant(&mut messages, message),
        }
    }
    messages
}

fn user_content(message: &ChatMessage) -> String {
    let mut content = message.text();
    for attachment in &message.attachments {
        let label = attachment.name.as_deref().unwrap_or("attachment");
        content.push_str(&format!("\n[{label}: {}]", attachment.url));
    }
    content
}

/// Assistant messages are split at step boundaries so each step's tool calls
/// are followed by their results, as providers expect.
fn push_assistant(messages: &mut Vec<PromptMessage>, message: &ChatMessage) {
    let mut text = String::new();
    let mut calls = Vec::new();
    let mut results = Vec::new();

    let flush = |messages: &mut Vec<PromptMessage>,
                 text: &mut String,
                 calls: &mut Vec<ToolCall>,
                 results: &mut Vec<PromptMessage>| {
        if text.is_empty() && calls.is_empty() {
            return;
        }
        messages.push(PromptMessage::Assistant {
            text: std::mem::take(text),
            tool_calls: std::mem::take(calls),
        });
        messages.append(results);
    };

    for part in &message.parts {
        match part {
            MessagePart::Text { text: chunk } => text.push_str(chunk),
            MessagePart::ToolInvocation { tool_invocation } => {
                let Some(result) = tool_invocation.result.as_ref() else {
                    continue;
                };
                if tool_invocation.state != ToolInvocationState::Result {
                    continue;
                }
                calls.push(ToolCall {
                    id: tool_invocation.tool_call_id.clone(),
                    name: tool_invocation.tool_name.clone(),
                    args: tool_invocation.args.clone(),
                });
                results.push(PromptMessage::ToolResult {
                    tool_call_id: tool_invocation.tool_call_id.clone(),
                    tool_name: tool_invocation.tool_name.clone(),
                    result: result.clone(),
                });
            }
            MessagePart::StepStart => flush(messages, &mut text, &mut calls, &mut results),
            MessagePart::Reasoning { .. }
            | MessagePart::Source { .. }
            | MessagePart::File { .. } => {}
        }
    }
    flush(messages, &mut text, &mut calls, &mut results);
}
