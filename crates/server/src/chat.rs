//! `POST /api/chat`: one streamed conversation turn.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderName};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use gingga_agent::runtime::Turn;
use gingga_agent::stream::{
    channel, DATA_STREAM_CONTENT_TYPE, DATA_STREAM_HEADER, DATA_STREAM_VERSION,
};
use gingga_agent::title::{fallback_title, generate_title};
use gingga_core::domain::agent::{Agent, AgentId};
use gingga_core::domain::chat::{Chat, ChatId, Visibility};
use gingga_core::domain::message::{MessageId, MessagePart, Role, UiMessage};
use gingga_core::errors::DomainError;
use gingga_core::ratelimit::{MessageType, RateLimitDecision};

use crate::app::AppState;
use crate::auth::Caller;
use crate::error::{ApiError, Correlate};

/// Model id assumed when the client does not pick one.
pub const DEFAULT_CHAT_MODEL: &str = "chat-model";

const STREAM_BUFFER: usize = 64;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub id: String,
    pub messages: Vec<UiMessage>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub selected_chat_model: Option<String>,
    #[serde(default)]
    pub selected_visibility_type: Option<Visibility>,
}

impl ChatRequest {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.id.trim().is_empty() {
            return Err(DomainError::Validation("chat id must not be empty".to_string()));
        }
        let Some(last) = self.messages.last() else {
            return Err(DomainError::Validation("messages must not be empty".to_string()));
        };
        if self.messages.iter().any(|message| message.id.trim().is_empty()) {
            return Err(DomainError::Validation("every message must carry an id".to_string()));
        }
        match last.role {
            Role::User => Ok(()),
            Role::Assistant if last.has_tool_results() => Ok(()),
            _ => Err(DomainError::Validation(
                "last message must come from the user or carry tool results".to_string(),
            )),
        }
    }

    /// Text of the first user message, used to title a new chat.
    fn opening_text(&self) -> String {
        self.messages
            .iter()
            .find(|message| message.role == Role::User)
            .map(|message| {
                let text = message.content.trim();
                if text.is_empty() {
                    message
                        .effective_parts()
                        .iter()
                        .filter_map(|part| match part {
                            MessagePart::Text { text } => Some(text.as_str()),
                            _ => None,
                        })
                        .collect::<Vec<_>>()
                        .join(" ")
                } else {
                    text.to_string()
                }
            })
            .unwrap_or_default()
    }
}

pub async fn handle(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let cid = caller.correlation_id.clone();
    let Json(request) =
        payload.map_err(|rejection| ApiError::bad_request(rejection.body_text(), &cid))?;
    request.validate().correlate(&cid)?;

    if caller.user.is_none() && !state.config.chat.allow_anonymous {
        return Err(ApiError::new(DomainError::Unauthenticated, &cid));
    }

    let selected = request.selected_chat_model.as_deref().unwrap_or(DEFAULT_CHAT_MODEL);
    let message_type = MessageType::for_model(selected);
    let decision = state.limiter.check(caller.tier(), message_type, &caller.subject()).await;
    if let RateLimitDecision::Limited { retry_after_secs } = decision {
        warn!(
            event_name = "chat.rate_limited",
            correlation_id = %cid,
            tier = caller.tier().as_str(),
            message_type = message_type.as_str(),
            retry_after_secs,
            "message quota exceeded"
        );
        return Err(ApiError::new(DomainError::RateLimited { retry_after_secs }, &cid));
    }

    let chat_id = ChatId(request.id.clone());
    let existing = state.chats.find_by_id(&chat_id).await.correlate(&cid)?;

    if let Some(chat) = &existing {
        if !chat.is_owned_by(caller.user_id()) {
            return Err(ApiError::new(
                DomainError::Forbidden(format!("chat `{}` belongs to another user", chat.id.0)),
                &cid,
            ));
        }
    }

    // Message ids are global; one stored under another chat cannot be written or replayed here.
    if let Some(last) = request.messages.last() {
        let stored = state.messages.find_by_id(&MessageId(last.id.clone())).await.correlate(&cid)?;
        if stored.is_some_and(|message| message.chat_id != chat_id) {
            return Err(ApiError::new(
                DomainError::Validation(format!("message id `{}` is already in use", last.id)),
                &cid,
            ));
        }
    }

    let agent_id = request
        .agent_id
        .clone()
        .map(AgentId)
        .or_else(|| existing.as_ref().and_then(|chat| chat.agent_id.clone()));
    let agent = resolve_agent(&state, agent_id, &cid).await?;

    let model = agent
        .as_ref()
        .and_then(|agent| agent.model.clone())
        .unwrap_or_else(|| state.config.llm.resolve_model(request.selected_chat_model.as_deref()));

    if existing.is_none() {
        let opening = request.opening_text();
        let title = if state.config.chat.generate_titles {
            generate_title(state.runtime.llm().as_ref(), &model, &opening).await
        } else {
            fallback_title(&opening)
        };
        let mut chat = Chat::new(
            chat_id.clone(),
            caller.user_id().cloned(),
            agent.as_ref().map(|agent| agent.id.clone()),
            title,
        );
        if let Some(visibility) = request.selected_visibility_type {
            chat.visibility = visibility;
        }
        let created = state.chats.create_if_absent(chat).await.correlate(&cid)?;
        info!(
            event_name = "chat.created",
            correlation_id = %cid,
            chat_id = %chat_id.0,
            created,
            "chat resolved"
        );
    }

    let ChatRequest { messages, .. } = request;
    let Some(inbound) = messages.into_iter().last() else {
        return Err(ApiError::bad_request("messages must not be empty", &cid));
    };
    let inbound = inbound.into_chat_message(chat_id.clone(), None);

    // Assistant messages carrying approvals are reconciled against the stored copy.
    if inbound.role == Role::User {
        state.messages.upsert(inbound.clone()).await.correlate(&cid)?;
    }

    let mut history = state.messages.list_for_chat(&chat_id).await.correlate(&cid)?;
    if inbound.role == Role::Assistant {
        history.retain(|message| message.id != inbound.id);
        history.push(inbound);
    }

    info!(
        event_name = "chat.turn.started",
        correlation_id = %cid,
        chat_id = %chat_id.0,
        model = %model,
        history_len = history.len(),
        "starting chat turn"
    );

    let turn = Turn { chat_id, agent, model, history, correlation_id: cid };
    let (writer, receiver) = channel(STREAM_BUFFER);
    let runtime = state.runtime.clone();
    tokio::spawn(async move {
        runtime.run(turn, writer).await;
    });

    let body = Body::from_stream(ReceiverStream::new(receiver).map(Ok::<_, Infallible>));
    Ok((
        [
            (header::CONTENT_TYPE, DATA_STREAM_CONTENT_TYPE),
            (HeaderName::from_static(DATA_STREAM_HEADER), DATA_STREAM_VERSION),
        ],
        body,
    )
        .into_response())
}

async fn resolve_agent(
    state: &AppState,
    agent_id: Option<AgentId>,
    cid: &str,
) -> Result<Option<Agent>, ApiError> {
    let Some(agent_id) = agent_id else {
        return Ok(None);
    };
    let agent = state.agents.find_by_id(&agent_id).await.correlate(cid)?;
    match agent {
        Some(agent) => Ok(Some(agent)),
        None => Err(ApiError::new(DomainError::not_found("agent", agent_id.0), cid)),
    }
}
