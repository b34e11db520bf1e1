use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use gingga_core::domain::agent::{Agent, AgentId};
use gingga_core::domain::chat::{Chat, ChatId, Visibility};
use gingga_core::domain::lead::Lead;
use gingga_core::domain::message::{ChatMessage, MessageId};
use gingga_core::domain::user::{Session, User, UserId};
use gingga_core::errors::ApplicationError;

pub mod agent;
pub mod chat;
pub mod lead;
pub mod memory;
pub mod message;
pub mod user;

pub use agent::SqlAgentRepository;
pub use chat::SqlChatRepository;
pub use lead::SqlLeadRepository;
pub use memory::{
    InMemoryAgentRepository, InMemoryChatRepository, InMemoryLeadRepository,
    InMemoryMessageRepository, InMemoryUserRepository,
};
pub use message::SqlMessageRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Persistence(value.to_string())
    }
}

#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn find_by_id(&self, id: &ChatId) -> Result<Option<Chat>, RepositoryError>;
    /// Inserts the chat unless a row with the same id exists. Returns whether a row was created.
    async fn create_if_absent(&self, chat: Chat) -> Result<bool, RepositoryError>;
    async fn rename(&self, id: &ChatId, title: &str) -> Result<bool, RepositoryError>;
    async fn set_visibility(
        &self,
        id: &ChatId,
        visibility: Visibility,
    ) -> Result<bool, RepositoryError>;
    async fn list_for_user(&self, user_id: &UserId, limit: u32)
        -> Result<Vec<Chat>, RepositoryError>;
    async fn delete(&self, id: &ChatId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn find_by_id(&self, id: &MessageId) -> Result<Option<ChatMessage>, RepositoryError>;
    async fn list_for_chat(&self, chat_id: &ChatId) -> Result<Vec<ChatMessage>, RepositoryError>;
    /// Inserts the message or replaces the parts of an existing one with the same id.
    async fn upsert(&self, message: ChatMessage) -> Result<(), RepositoryError>;
    /// Deletes `from` and every later message of the chat. Returns the number removed.
    async fn delete_trailing(
        &self,
        chat_id: &ChatId,
        from: &MessageId,
    ) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn find_by_id(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError>;
    async fn save(&self, agent: Agent) -> Result<(), RepositoryError>;
    async fn list_for_owner(&self, owner_id: &UserId) -> Result<Vec<Agent>, RepositoryError>;
    async fn delete(&self, id: &AgentId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait LeadRepository: Send + Sync {
    async fn save(&self, lead: Lead) -> Result<(), RepositoryError>;
    async fn list_for_agent(
        &self,
        agent_id: &AgentId,
        limit: u32,
    ) -> Result<Vec<Lead>, RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    async fn save(&self, user: User) -> Result<(), RepositoryError>;
    async fn find_session(&self, token_hash: &str) -> Result<Option<Session>, RepositoryError>;
    async fn save_session(&self, session: Session) -> Result<(), RepositoryError>;
}

/// Fixed-width UTC timestamps so text ordering matches chronological ordering.
pub(crate) fn encode_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

pub(crate) fn decode_error(error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}
