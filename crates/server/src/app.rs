use std::sync::Arc;

use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use gingga_agent::lead::{CaptureLeadTool, LeadNotifier};
use gingga_agent::llm::LlmClient;
use gingga_agent::runtime::ChatRuntime;
use gingga_agent::tools::ToolRegistry;
use gingga_core::config::AppConfig;
use gingga_core::ratelimit::RateLimiter;
use gingga_db::repositories::{
    AgentRepository, ChatRepository, LeadRepository, MessageRepository, SqlAgentRepository,
    SqlChatRepository, SqlLeadRepository, SqlMessageRepository, SqlUserRepository,
    UserRepository,
};
use gingga_db::DbPool;

use crate::{agents, auth, chat, chats, health};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub chats: Arc<dyn ChatRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub agents: Arc<dyn AgentRepository>,
    pub leads: Arc<dyn LeadRepository>,
    pub users: Arc<dyn UserRepository>,
    pub limiter: Arc<dyn RateLimiter>,
    pub runtime: Arc<ChatRuntime>,
    db_pool: DbPool,
}

impl AppState {
    /// Wires SQL repositories, the tool registry and the chat runtime around one pool.
    pub fn from_parts(
        config: AppConfig,
        db_pool: DbPool,
        llm: Arc<dyn LlmClient>,
        limiter: Arc<dyn RateLimiter>,
        notifier: Arc<dyn LeadNotifier>,
    ) -> Self {
        let messages: Arc<dyn MessageRepository> =
            Arc::new(SqlMessageRepository::new(db_pool.clone()));
        let leads: Arc<dyn LeadRepository> = Arc::new(SqlLeadRepository::new(db_pool.clone()));

        let mut tools = ToolRegistry::default();
        tools.register(CaptureLeadTool::new(leads.clone(), notifier));

        let runtime = ChatRuntime::new(
            llm,
            Arc::new(tools),
            messages.clone(),
            &config.chat,
            config.llm.max_tokens,
        );

        Self {
            chats: Arc::new(SqlChatRepository::new(db_pool.clone())),
            agents: Arc::new(SqlAgentRepository::new(db_pool.clone())),
            users: Arc::new(SqlUserRepository::new(db_pool.clone())),
            messages,
            leads,
            limiter,
            runtime: Arc::new(runtime),
            config: Arc::new(config),
            db_pool,
        }
    }

    pub fn db_pool(&self) -> &DbPool {
        &self.db_pool
    }
}

pub fn router(state: AppState) -> Router {
    let health = health::router(state.db_pool.clone());

    Router::new()
        .route("/api/chat", post(chat::handle))
        .route("/api/auth/session", get(auth::session))
        .route("/api/chats", get(chats::list))
        .route("/api/chats/{id}", get(chats::show).delete(chats::remove))
        .route("/api/chats/{id}/messages", get(chats::messages))
        .route("/api/chats/{id}/title", patch(chats::rename))
        .route("/api/chats/{id}/visibility", patch(chats::set_visibility))
        .route("/api/chats/{id}/messages/after/{message_id}", delete(chats::delete_trailing))
        .route("/api/agents", get(agents::list).post(agents::create))
        .route("/api/agents/{id}", get(agents::show).patch(agents::update).delete(agents::remove))
        .route("/api/agents/{id}/leads", get(agents::leads))
        .with_state(state)
        .merge(health)
        .layer(TraceLayer::new_for_http())
}
