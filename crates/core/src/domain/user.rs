use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Subscription level. `Guest` is reserved for unauthenticated callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Guest,
    Free,
    Pro,
    Enterprise,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "guest" => Ok(Self::Guest),
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(DomainError::Validation(format!("unsupported tier `{other}`"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub tier: Tier,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub token_hash: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Bearer tokens are never stored in clear text; lookups go through this hash.
pub fn hash_session_token(token: &str) -> String {
    let digest = Sha256::digest(token.trim().as_bytes());
    format!("{digest:x}")
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{hash_session_token, Session, Tier, UserId};

    #[test]
    fn token_hash_is_stable_hex_and_ignores_surrounding_whitespace() {
        let hash = hash_session_token("token-abc");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, hash_session_token("  token-abc\n"));
        assert_ne!(hash, hash_session_token("token-abd"));
    }

    #[test]
    fn session_expiry_is_inclusive() {
        let now = Utc::now();
        let session = Session {
            token_hash: hash_session_token("t"),
            user_id: UserId("u1".to_string()),
            expires_at: now,
        };
        assert!(session.is_expired_at(now));
        assert!(!session.is_expired_at(now - Duration::seconds(1)));
    }

    #[test]
    fn tier_round_trips_through_str() {
        for tier in [Tier::Guest, Tier::Free, Tier::Pro, Tier::Enterprise] {
            assert_eq!(tier.as_str().parse::<Tier>().expect("parse"), tier);
        }
        assert!("platinum".parse::<Tier>().is_err());
    }
}
