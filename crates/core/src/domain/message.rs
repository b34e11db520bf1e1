//! Conversation messages and their structured parts.
//!
//! The wire shape follows the UI message format used by the dashboard client:
//! every message carries a list of typed parts, and tool invocations move
//! through `partial-call` -> `call` -> `result`. Human approval is signalled by
//! the client writing one of two sentinel strings as the invocation result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::chat::ChatId;
use crate::errors::DomainError;

pub const APPROVAL_YES: &str = "Yes, confirmed.";
pub const APPROVAL_NO: &str = "No, denied.";
pub const DENIAL_MESSAGE: &str = "User denied access to tool execution";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(DomainError::Validation(format!("unsupported message role `{other}`"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolInvocationState {
    PartialCall,
    Call,
    Result,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Denied,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub state: ToolInvocationState,
    #[serde(rename = "toolCallId")]
    pub tool_call_id: String,
    #[serde(rename = "toolName")]
    pub tool_name: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
}

impl ToolInvocation {
    pub fn call(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: Value,
    ) -> Self {
        Self {
            state: ToolInvocationState::Call,
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            args,
            result: None,
            step: None,
        }
    }

    /// The human decision recorded on this invocation, if it is still awaiting execution.
    pub fn approval_decision(&self) -> Option<ApprovalDecision> {
        if self.state != ToolInvocationState::Result {
            return None;
        }
        match self.result.as_ref().and_then(Value::as_str) {
            Some(APPROVAL_YES) => Some(ApprovalDecision::Approved),
            Some(APPROVAL_NO) => Some(ApprovalDecision::Denied),
            _ => None,
        }
    }

    /// A result is terminal once it holds anything other than an approval sentinel.
    pub fn has_terminal_result(&self) -> bool {
        self.state == ToolInvocationState::Result
            && self.result.is_some()
            && self.approval_decision().is_none()
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.state = ToolInvocationState::Result;
        self.result = Some(result);
        self
    }
}

pub fn denial_result() -> Value {
    json!({ "error": DENIAL_MESSAGE })
}

pub fn execution_failure_result(message: &str) -> Value {
    json!({ "error": format!("Tool execution failed: {message}") })
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    Text {
        #[serde(default)]
        text: String,
    },
    Reasoning {
        #[serde(default)]
        reasoning: String,
    },
    ToolInvocation {
        #[serde(rename = "toolInvocation")]
        tool_invocation: ToolInvocation,
    },
    Source {
        #[serde(default)]
        source: Value,
    },
    File {
        #[serde(rename = "mimeType", default)]
        mime_type: String,
        #[serde(default)]
        data: String,
    },
    StepStart,
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_invocation(&self) -> Option<&ToolInvocation> {
        match self {
            Self::ToolInvocation { tool_invocation } => Some(tool_invocation),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "contentType", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub role: Role,
    pub parts: Vec<MessagePart>,
    pub attachments: Vec<Attachment>,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn tool_invocations(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.parts.iter().filter_map(MessagePart::tool_invocation)
    }

    /// Concatenated text parts, used for titles and prompt rendering.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn to_ui(&self) -> UiMessage {
        UiMessage {
            id: self.id.0.clone(),
            role: self.role,
            content: self.text(),
            parts: self.parts.clone(),
            attachments: self.attachments.clone(),
            created_at: Some(self.created_at),
        }
    }
}

/// Message as sent by (and returned to) the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UiMessage {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
    #[serde(rename = "experimental_attachments", default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl UiMessage {
    /// Parts to persist; older clients send only `content`.
    pub fn effective_parts(&self) -> Vec<MessagePart> {
        if self.parts.is_empty() && !self.content.is_empty() {
            return vec![MessagePart::text(self.content.clone())];
        }
        self.parts.clone()
    }

    pub fn has_tool_results(&self) -> bool {
        self.parts.iter().filter_map(MessagePart::tool_invocation).any(|invocation| {
            invocation.state == ToolInvocationState::Result
        })
    }

    pub fn into_chat_message(self, chat_id: ChatId, model: Option<String>) -> ChatMessage {
        let parts = self.effective_parts();
        ChatMessage {
            id: MessageId(self.id),
            chat_id,
            role: self.role,
            parts,
            attachments: self.attachments,
            model,
            created_at: self.created_at.unwrap_or_else(Utc::now),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        denial_result, ApprovalDecision, MessagePart, Role, ToolInvocation, ToolInvocationState,
        UiMessage, APPROVAL_NO, APPROVAL_YES,
    };

    #[test]
    fn text_part_without_text_field_deserializes() {
        let message: UiMessage = serde_json::from_value(json!({
            "id": "m1",
            "role": "user",
            "parts": [{ "type": "text" }]
        }))
        .expect("message should parse");

        assert_eq!(message.role, Role::User);
        assert_eq!(message.parts, vec![MessagePart::text("")]);
    }

    #[test]
    fn tool_invocation_part_uses_client_field_names() {
        let part: MessagePart = serde_json::from_value(json!({
            "type": "tool-invocation",
            "toolInvocation": {
                "state": "result",
                "toolCallId": "call-1",
                "toolName": "capture_lead",
                "args": { "email": "a@b.co" },
                "result": APPROVAL_YES
            }
        }))
        .expect("part should parse");

        let invocation = part.tool_invocation().expect("tool invocation");
        assert_eq!(invocation.state, ToolInvocationState::Result);
        assert_eq!(invocation.approval_decision(), Some(ApprovalDecision::Approved));

        let encoded = serde_json::to_value(&part).expect("encode");
        assert_eq!(encoded["toolInvocation"]["toolCallId"], "call-1");
        assert_eq!(encoded["type"], "tool-invocation");
    }

    #[test]
    fn approval_decision_requires_result_state() {
        let mut invocation = ToolInvocation::call("c", "t", json!({}));
        invocation.result = Some(json!(APPROVAL_NO));
        assert_eq!(invocation.approval_decision(), None);

        let invocation = invocation.with_result(json!(APPROVAL_NO));
        assert_eq!(invocation.approval_decision(), Some(ApprovalDecision::Denied));
        assert!(!invocation.has_terminal_result());
    }

    #[test]
    fn executed_or_denied_results_are_terminal() {
        let executed = ToolInvocation::call("c", "t", json!({})).with_result(json!({"ok": true}));
        assert!(executed.has_terminal_result());

        let denied = ToolInvocation::call("c", "t", json!({})).with_result(denial_result());
        assert!(denied.has_terminal_result());
        assert!(denial_result().get("error").is_some());
    }

    #[test]
    fn content_only_messages_get_a_text_part() {
        let message = UiMessage {
            id: "m1".to_string(),
            role: Role::User,
            content: "hi".to_string(),
            parts: Vec::new(),
            attachments: Vec::new(),
            created_at: None,
        };
        assert_eq!(message.effective_parts(), vec![MessagePart::text("hi")]);
    }

    #[test]
    fn step_start_round_trips_as_kebab_case() {
        let encoded = serde_json::to_value(MessagePart::StepStart).expect("encode");
        assert_eq!(encoded, json!({ "type": "step-start" }));
    }
}
