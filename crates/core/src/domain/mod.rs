pub mod agent;
pub mod chat;
pub mod lead;
pub mod message;
pub mod user;
