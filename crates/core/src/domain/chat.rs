use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::AgentId;
use crate::domain::user::UserId;
use crate::errors::DomainError;

pub const MAX_TITLE_CHARS: usize = 80;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

impl std::str::FromStr for Visibility {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            other => Err(DomainError::Validation(format!(
                "unsupported visibility `{other}` (expected public|private)"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub user_id: Option<UserId>,
    pub title: String,
    pub visibility: Visibility,
    pub agent_id: Option<AgentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn new(
        id: ChatId,
        user_id: Option<UserId>,
        agent_id: Option<AgentId>,
        title: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            title: normalize_title(&title.into()),
            visibility: Visibility::Private,
            agent_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, user_id: Option<&UserId>) -> bool {
        match (&self.user_id, user_id) {
            (Some(owner), Some(caller)) => owner == caller,
            (None, _) => true,
            (Some(_), None) => false,
        }
    }

    /// Public chats are readable by anyone; private ones only by their owner.
    pub fn is_readable_by(&self, user_id: Option<&UserId>) -> bool {
        self.visibility == Visibility::Public || self.is_owned_by(user_id)
    }

    pub fn rename(&mut self, title: &str) -> Result<(), DomainError> {
        let title = normalize_title(title);
        if title.is_empty() {
            return Err(DomainError::Validation("chat title must not be empty".to_string()));
        }
        self.title = title;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Collapses whitespace and truncates to [`MAX_TITLE_CHARS`] characters.
pub fn normalize_title(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches(|c: char| c == '"' || c == '\'' || c.is_whitespace());
    trimmed.chars().take(MAX_TITLE_CHARS).collect()
}
