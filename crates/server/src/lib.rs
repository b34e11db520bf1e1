//! HTTP surface of the Gingga chat backend: the streaming chat endpoint plus
//! the JSON routes the dashboard uses to manage chats, agents and leads.

pub mod agents;
pub mod app;
pub mod auth;
pub mod bootstrap;
pub mod chat;
pub mod chats;
pub mod error;
pub mod health;

pub use app::{router, AppState};
