use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Assistant,
    LeadCapture,
    Support,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assistant => "assistant",
            Self::LeadCapture => "lead_capture",
            Self::Support => "support",
        }
    }
}

impl std::str::FromStr for AgentKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "assistant" => Ok(Self::Assistant),
            "lead_capture" | "lead-capture" => Ok(Self::LeadCapture),
            "support" => Ok(Self::Support),
            other => Err(DomainError::Validation(format!(
                "unsupported agent type `{other}` (expected assistant|lead_capture|support)"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub owner_id: UserId,
    pub name: String,
    pub description: String,
    pub instructions: String,
    pub kind: AgentKind,
    pub model: Option<String>,
    pub webhook_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::Validation("agent name must not be empty".to_string()));
        }
        if let Some(url) = &self.webhook_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(DomainError::Validation(
                    "agent webhook_url must start with http:// or https://".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn captures_leads(&self) -> bool {
        self.kind == AgentKind::LeadCapture
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{Agent, AgentId, AgentKind};
    use crate::domain::user::UserId;

    fn agent() -> Agent {
        Agent {
            id: AgentId("a1".to_string()),
            owner_id: UserId("u1".to_string()),
            name: "Sales desk".to_string(),
            description: String::new(),
            instructions: "Qualify inbound visitors.".to_string(),
            kind: AgentKind::LeadCapture,
            model: None,
            webhook_url: Some("https://hooks.example.com/lead".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn valid_agent_passes() {
        assert!(agent().validate().is_ok());
        assert!(agent().captures_leads());
    }

    #[test]
    fn webhook_must_be_http() {
        let mut agent = agent();
        agent.webhook_url = Some("ftp://nope".to_string());
        assert!(agent.validate().is_err());
    }

    #[test]
    fn kind_accepts_dashed_alias() {
        assert_eq!("lead-capture".parse::<AgentKind>().expect("parse"), AgentKind::LeadCapture);
    }
}
