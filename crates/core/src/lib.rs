//! Domain model, configuration, and quota policy shared by every Gingga crate.

pub mod config;
pub mod domain;
pub mod errors;
pub mod ratelimit;

pub use domain::agent::{Agent, AgentId, AgentKind};
pub use domain::chat::{Chat, ChatId, Visibility};
pub use domain::lead::{Lead, LeadId};
pub use domain::message::{
    ApprovalDecision, Attachment, ChatMessage, MessageId, MessagePart, Role, ToolInvocation,
    ToolInvocationState, UiMessage,
};
pub use domain::user::{Session, Tier, User, UserId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use ratelimit::{MessageType, RateLimitDecision, RateLimiter, SlidingWindowLimiter};
