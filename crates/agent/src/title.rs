use gingga_core::domain::chat::normalize_title;

use crate::llm::{LlmClient, LlmRequest, PromptMessage};

pub const DEFAULT_TITLE: &str = "New chat";

const TITLE_INSTRUCTIONS: &str = "Generate a short title for a conversation that starts with the \
user's message below. Use at most 80 characters, no quotes or colons, and reply with the title only.";

/// Asks the model for a title; falls back to the message itself when that fails.
pub async fn generate_title(llm: &dyn LlmClient, model: &str, first_message: &str) -> String {
    let request = LlmRequest {
        model: model.to_string(),
        messages: vec![
            PromptMessage::System(TITLE_INSTRUCTIONS.to_string()),
            PromptMessage::User(first_message.to_string()),
        ],
        tools: Vec::new(),
        max_tokens: 32,
    };

    match llm.complete(request).await {
        Ok(raw) => {
            let title = normalize_title(raw.lines().next().unwrap_or_default());
            if title.is_empty() {
                fallback_title(first_message)
            } else {
                title
            }
        }
        Err(error) => {
            tracing::warn!(
                event_name = "agent.title.fallback",
                error = %error,
                "title generation failed; using message text"
            );
            fallback_title(first_message)
        }
    }
}

pub fn fallback_title(first_message: &str) -> String {
    let title = normalize_title(first_message);
    if title.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        title
    }
}
