use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::AgentId;
use crate::domain::chat::ChatId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub agent_id: AgentId,
    pub chat_id: Option<ChatId>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub notes: Option<String>,
    pub qualification_score: u8,
    pub qualification_reason: String,
    pub created_at: DateTime<Utc>,
}

impl Lead {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::Validation("lead name must not be empty".to_string()));
        }
        let email = self.email.trim();
        let well_formed = email
            .split_once('@')
            .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
            .unwrap_or(false);
        if !well_formed {
            return Err(DomainError::Validation(format!("lead email `{email}` is not valid")));
        }
        if self.qualification_score > 100 {
            return Err(DomainError::Validation(
                "lead qualification_score must be in range 0..=100".to_string(),
            ));
        }
        Ok(())
    }
}
