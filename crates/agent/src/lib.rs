//! Agent runtime for chat turns.
//!
//! - `llm`: provider clients (OpenAI-compatible, Anthropic) behind [`llm::LlmClient`]
//! - `tools`: server-side tools and their registry
//! - `approval`: applies human approve/deny decisions recorded on tool invocations
//! - `prompt`: converts stored history into provider messages
//! - `stream`: the line-oriented data stream sent to the browser
//! - `runtime`: the multi-step generation loop for one turn
//!
//! The model never executes a tool that requires approval on its own. Those calls
//! are left pending in the assistant message until the user answers them.

pub mod approval;
pub mod lead;
pub mod llm;
pub mod prompt;
pub mod runtime;
pub mod stream;
pub mod title;
pub mod tools;
