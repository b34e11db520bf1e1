use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use gingga_core::domain::agent::{Agent, AgentId, AgentKind};
use gingga_core::domain::lead::Lead;
use gingga_core::errors::DomainError;

use crate::app::AppState;
use crate::auth::AuthedUser;
use crate::error::{ApiError, Correlate};

const DEFAULT_LEAD_LIMIT: u32 = 100;
const MAX_LEAD_LIMIT: u32 = 500;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub instructions: String,
    #[serde(rename = "type")]
    pub kind: AgentKind,
    pub model: Option<String>,
    pub webhook_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Agent> for AgentView {
    fn from(agent: Agent) -> Self {
        Self {
            id: agent.id.0,
            name: agent.name,
            description: agent.description,
            instructions: agent.instructions,
            kind: agent.kind,
            model: agent.model,
            webhook_url: agent.webhook_url,
            created_at: agent.created_at.to_rfc3339(),
            updated_at: agent.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadView {
    pub id: String,
    pub chat_id: Option<String>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub notes: Option<String>,
    pub qualification_score: u8,
    pub qualification_reason: String,
    pub created_at: String,
}

impl From<Lead> for LeadView {
    fn from(lead: Lead) -> Self {
        Self {
            id: lead.id.0,
            chat_id: lead.chat_id.map(|id| id.0),
            name: lead.name,
            email: lead.email,
            phone: lead.phone,
            company: lead.company,
            notes: lead.notes,
            qualification_score: lead.qualification_score,
            qualification_reason: lead.qualification_reason,
            created_at: lead.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// Every field is optional; absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAgentRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub instructions: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub model: Option<String>,
    pub webhook_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LeadQuery {
    #[serde(default)]
    pub limit: Option<u32>,
}

fn default_kind() -> String {
    AgentKind::Assistant.as_str().to_string()
}

/// Blank strings clear optional fields.
fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

pub async fn list(
    State(state): State<AppState>,
    authed: AuthedUser,
) -> Result<Json<Vec<AgentView>>, ApiError> {
    let agents =
        state.agents.list_for_owner(&authed.user.id).await.correlate(&authed.correlation_id)?;
    Ok(Json(agents.into_iter().map(AgentView::from).collect()))
}

pub async fn create(
    State(state): State<AppState>,
    authed: AuthedUser,
    payload: Result<Json<CreateAgentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AgentView>), ApiError> {
    let cid = authed.correlation_id.clone();
    let Json(body) =
        payload.map_err(|rejection| ApiError::bad_request(rejection.body_text(), &cid))?;

    let now = Utc::now();
    let agent = Agent {
        id: AgentId(uuid::Uuid::new_v4().to_string()),
        owner_id: authed.user.id.clone(),
        name: body.name.trim().to_string(),
        description: body.description,
        instructions: body.instructions,
        kind: body.kind.parse::<AgentKind>().correlate(&cid)?,
        model: non_blank(body.model),
        webhook_url: non_blank(body.webhook_url),
        created_at: now,
        updated_at: now,
    };
    agent.validate().correlate(&cid)?;
    state.agents.save(agent.clone()).await.correlate(&cid)?;

    tracing::info!(
        event_name = "agent.created",
        correlation_id = %cid,
        agent_id = %agent.id.0,
        kind = agent.kind.as_str(),
        "agent created"
    );
    Ok((StatusCode::CREATED, Json(agent.into())))
}

pub async fn show(
    State(state): State<AppState>,
    authed: AuthedUser,
    Path(id): Path<String>,
) -> Result<Json<AgentView>, ApiError> {
    let agent = owned_agent(&state, &authed, id).await?;
    Ok(Json(agent.into()))
}

pub async fn update(
    State(state): State<AppState>,
    authed: AuthedUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdateAgentRequest>, JsonRejection>,
) -> Result<Json<AgentView>, ApiError> {
    let cid = authed.correlation_id.clone();
    let Json(body) =
        payload.map_err(|rejection| ApiError::bad_request(rejection.body_text(), &cid))?;
    let mut agent = owned_agent(&state, &authed, id).await?;

    if let Some(name) = body.name {
        agent.name = name.trim().to_string();
    }
    if let Some(description) = body.description {
        agent.description = description;
    }
    if let Some(instructions) = body.instructions {
        agent.instructions = instructions;
    }
    if let Some(kind) = body.kind {
        agent.kind = kind.parse::<AgentKind>().correlate(&cid)?;
    }
    if body.model.is_some() {
        agent.model = non_blank(body.model);
    }
    if body.webhook_url.is_some() {
        agent.webhook_url = non_blank(body.webhook_url);
    }
    agent.updated_at = Utc::now();
    agent.validate().correlate(&cid)?;

    state.agents.save(agent.clone()).await.correlate(&cid)?;
    Ok(Json(agent.into()))
}

pub async fn remove(
    State(state): State<AppState>,
    authed: AuthedUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let agent = owned_agent(&state, &authed, id).await?;
    state.agents.delete(&agent.id).await.correlate(&authed.correlation_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn leads(
    State(state): State<AppState>,
    authed: AuthedUser,
    Path(id): Path<String>,
    Query(query): Query<LeadQuery>,
) -> Result<Json<Vec<LeadView>>, ApiError> {
    let agent = owned_agent(&state, &authed, id).await?;
    let limit = query.limit.unwrap_or(DEFAULT_LEAD_LIMIT).clamp(1, MAX_LEAD_LIMIT);
    let leads =
        state.leads.list_for_agent(&agent.id, limit).await.correlate(&authed.correlation_id)?;
    Ok(Json(leads.into_iter().map(LeadView::from).collect()))
}

async fn owned_agent(state: &AppState, authed: &AuthedUser, id: String) -> Result<Agent, ApiError> {
    let cid = &authed.correlation_id;
    let agent_id = AgentId(id);
    let Some(agent) = state.agents.find_by_id(&agent_id).await.correlate(cid)? else {
        return Err(ApiError::new(DomainError::not_found("agent", agent_id.0), cid));
    };
    if agent.owner_id != authed.user.id {
        return Err(ApiError::new(
            DomainError::Forbidden(format!("agent `{}` belongs to another user", agent.id.0)),
            cid,
        ));
    }
    Ok(agent)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{non_blank, CreateAgentRequest, UpdateAgentRequest};

    #[test]
    fn create_request_defaults_to_assistant() {
        let request: CreateAgentRequest =
            serde_json::from_value(json!({"name": "Support desk"})).expect("deserialize");
        assert_eq!(request.kind, "assistant");
        assert!(request.webhook_url.is_none());
    }

    #[test]
    fn update_request_reads_type_and_camel_case() {
        let request: UpdateAgentRequest =
            serde_json::from_value(json!({"type": "lead_capture", "webhookUrl": ""}))
                .expect("deserialize");
        assert_eq!(request.kind.as_deref(), Some("lead_capture"));
        assert_eq!(non_blank(request.webhook_url), None);
        assert_eq!(non_blank(Some(" llama3.1 ".to_string())).as_deref(), Some("llama3.1"));
    }
}
