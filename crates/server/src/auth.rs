//! Bearer-session extractors.
//!
//! Sessions are issued by the external auth provider; this service only looks
//! up the hashed token and loads the owning user.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use gingga_core::domain::user::{hash_session_token, Tier, User, UserId};
use gingga_core::errors::DomainError;

use crate::app::AppState;
use crate::error::{ApiError, Correlate};

const REQUEST_ID_HEADER: &str = "x-request-id";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// The caller of a request, authenticated or not.
#[derive(Clone, Debug)]
pub struct Caller {
    pub user: Option<User>,
    pub client_addr: String,
    pub correlation_id: String,
}

impl Caller {
    pub fn user_id(&self) -> Option<&UserId> {
        self.user.as_ref().map(|user| &user.id)
    }

    pub fn tier(&self) -> Tier {
        self.user.as_ref().map(|user| user.tier).unwrap_or(Tier::Guest)
    }

    /// Rate-limit subject: the user id, or the client address for guests.
    pub fn subject(&self) -> String {
        match &self.user {
            Some(user) => user.id.0.clone(),
            None => self.client_addr.clone(),
        }
    }
}

/// A caller that must hold a valid session.
#[derive(Clone, Debug)]
pub struct AuthedUser {
    pub user: User,
    pub correlation_id: String,
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let correlation_id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let client_addr = client_addr(parts, state.config.server.trust_forwarded_for);

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty());

        let user = match token {
            None => None,
            Some(token) => Some(load_user(state, token, &correlation_id).await?),
        };

        Ok(Self { user, client_addr, correlation_id })
    }
}

impl FromRequestParts<AppState> for AuthedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let caller = Caller::from_request_parts(parts, state).await?;
        match caller.user {
            Some(user) => Ok(Self { user, correlation_id: caller.correlation_id }),
            None => Err(ApiError::new(DomainError::Unauthenticated, &caller.correlation_id)),
        }
    }
}

async fn load_user(state: &AppState, token: &str, correlation_id: &str) -> Result<User, ApiError> {
    let unauthenticated = || ApiError::new(DomainError::Unauthenticated, correlation_id);

    let session = state
        .users
        .find_session(&hash_session_token(token))
        .await
        .correlate(correlation_id)?
        .filter(|session| !session.is_expired_at(Utc::now()))
        .ok_or_else(unauthenticated)?;

    state
        .users
        .find_by_id(&session.user_id)
        .await
        .correlate(correlation_id)?
        .ok_or_else(unauthenticated)
}

/// Client-supplied forwarding headers are ignored unless a trusted proxy sets them.
fn client_addr(parts: &Parts, trust_forwarded_for: bool) -> String {
    let forwarded = parts
        .headers
        .get(FORWARDED_FOR_HEADER)
        .filter(|_| trust_forwarded_for)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(addr) = forwarded {
        return addr.to_string();
    }

    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub user: User,
}

pub async fn session(authed: AuthedUser) -> Json<SessionView> {
    Json(SessionView { user: authed.user })
}
