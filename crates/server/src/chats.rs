use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use gingga_core::domain::chat::{Chat, ChatId, Visibility};
use gingga_core::domain::message::{MessageId, UiMessage};
use gingga_core::errors::DomainError;

use crate::app::AppState;
use crate::auth::{AuthedUser, Caller};
use crate::error::{ApiError, Correlate};

const DEFAULT_LIST_LIMIT: u32 = 50;
const MAX_LIST_LIMIT: u32 = 200;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatView {
    pub id: String,
    pub title: String,
    pub visibility: Visibility,
    pub user_id: Option<String>,
    pub agent_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Chat> for ChatView {
    fn from(chat: Chat) -> Self {
        Self {
            id: chat.id.0,
            title: chat.title,
            visibility: chat.visibility,
            user_id: chat.user_id.map(|id| id.0),
            agent_id: chat.agent_id.map(|id| id.0),
            created_at: chat.created_at.to_rfc3339(),
            updated_at: chat.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    pub visibility: Visibility,
}

#[derive(Debug, Serialize)]
pub struct DeletedView {
    pub deleted: u64,
}

pub async fn list(
    State(state): State<AppState>,
    authed: AuthedUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ChatView>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    let chats =
        state.chats.list_for_user(&authed.user.id, limit).await.correlate(&authed.correlation_id)?;
    Ok(Json(chats.into_iter().map(ChatView::from).collect()))
}

pub async fn show(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ChatView>, ApiError> {
    let chat = readable_chat(&state, &caller, id).await?;
    Ok(Json(chat.into()))
}

pub async fn messages(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Vec<UiMessage>>, ApiError> {
    let chat = readable_chat(&state, &caller, id).await?;
    let messages = state.messages.list_for_chat(&chat.id).await.correlate(&caller.correlation_id)?;
    Ok(Json(messages.iter().map(|message| message.to_ui()).collect()))
}

pub async fn rename(
    State(state): State<AppState>,
    authed: AuthedUser,
    Path(id): Path<String>,
    payload: Result<Json<RenameRequest>, JsonRejection>,
) -> Result<Json<ChatView>, ApiError> {
    let cid = authed.correlation_id.clone();
    let Json(body) =
        payload.map_err(|rejection| ApiError::bad_request(rejection.body_text(), &cid))?;
    let mut chat = owned_chat(&state, &authed, id).await?;

    chat.rename(&body.title).correlate(&cid)?;
    state.chats.rename(&chat.id, &chat.title).await.correlate(&cid)?;
    Ok(Json(chat.into()))
}

pub async fn set_visibility(
    State(state): State<AppState>,
    authed: AuthedUser,
    Path(id): Path<String>,
    payload: Result<Json<VisibilityRequest>, JsonRejection>,
) -> Result<Json<ChatView>, ApiError> {
    let cid = authed.correlation_id.clone();
    let Json(body) =
        payload.map_err(|rejection| ApiError::bad_request(rejection.body_text(), &cid))?;
    let mut chat = owned_chat(&state, &authed, id).await?;

    state.chats.set_visibility(&chat.id, body.visibility).await.correlate(&cid)?;
    chat.visibility = body.visibility;
    Ok(Json(chat.into()))
}

pub async fn remove(
    State(state): State<AppState>,
    authed: AuthedUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let chat = owned_chat(&state, &authed, id).await?;
    state.chats.delete(&chat.id).await.correlate(&authed.correlation_id)?;
    tracing::info!(
        event_name = "chat.deleted",
        correlation_id = %authed.correlation_id,
        chat_id = %chat.id.0,
        "chat deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

/// Drops `message_id` and everything after it, so an edited message can be resent.
pub async fn delete_trailing(
    State(state): State<AppState>,
    authed: AuthedUser,
    Path((id, message_id)): Path<(String, String)>,
) -> Result<Json<DeletedView>, ApiError> {
    let chat = owned_chat(&state, &authed, id).await?;
    let deleted = state
        .messages
        .delete_trailing(&chat.id, &MessageId(message_id))
        .await
        .correlate(&authed.correlation_id)?;
    Ok(Json(DeletedView { deleted }))
}

async fn find_chat(state: &AppState, id: String, cid: &str) -> Result<Chat, ApiError> {
    let chat_id = ChatId(id);
    match state.chats.find_by_id(&chat_id).await.correlate(cid)? {
        Some(chat) => Ok(chat),
        None => Err(ApiError::new(DomainError::not_found("chat", chat_id.0), cid)),
    }
}

async fn readable_chat(state: &AppState, caller: &Caller, id: String) -> Result<Chat, ApiError> {
    let chat = find_chat(state, id, &caller.correlation_id).await?;
    if !chat.is_readable_by(caller.user_id()) {
        return Err(ApiError::new(
            DomainError::Forbidden(format!("chat `{}` is private", chat.id.0)),
            &caller.correlation_id,
        ));
    }
    Ok(chat)
}

/// Mutations need an owner match; unowned guest chats cannot be managed.
async fn owned_chat(state: &AppState, authed: &AuthedUser, id: String) -> Result<Chat, ApiError> {
    let chat = find_chat(state, id, &authed.correlation_id).await?;
    if chat.user_id.as_ref() != Some(&authed.user.id) {
        return Err(ApiError::new(
            DomainError::Forbidden(format!("chat `{}` belongs to another user", chat.id.0)),
            &authed.correlation_id,
        ));
    }
    Ok(chat)
}
