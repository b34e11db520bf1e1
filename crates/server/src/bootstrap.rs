use std::sync::Arc;
use std::time::Duration;

use gingga_agent::lead::WebhookNotifier;
use gingga_agent::llm::{build_client, LlmError};
use gingga_agent::tools::ToolError;
use gingga_core::config::{AppConfig, ConfigError, LoadOptions};
use gingga_core::ratelimit::{NoopRateLimiter, RateLimiter, SlidingWindowLimiter};
use gingga_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tracing::info;

use crate::app::AppState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
    /// Present when quotas are enforced; swept periodically by the server loop.
    pub limiter: Option<SlidingWindowLimiter>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("llm client setup failed: {0}")]
    Llm(#[source] LlmError),
    #[error("webhook client setup failed: {0}")]
    Webhook(#[source] ToolError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let llm = build_client(&config.llm).map_err(BootstrapError::Llm)?;
    let notifier = WebhookNotifier::new(Duration::from_secs(config.llm.timeout_secs.max(1)))
        .map_err(BootstrapError::Webhook)?;

    let sliding =
        config.rate_limit.enabled.then(|| SlidingWindowLimiter::from_config(&config.rate_limit));
    let limiter: Arc<dyn RateLimiter> = match &sliding {
        Some(limiter) => Arc::new(limiter.clone()),
        None => Arc::new(NoopRateLimiter),
    };
    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        llm_provider = ?config.llm.provider,
        llm_model = %config.llm.model,
        rate_limit_enabled = config.rate_limit.enabled,
        "application components initialized"
    );

    let state =
        AppState::from_parts(config.clone(), db_pool.clone(), llm, limiter, Arc::new(notifier));
    Ok(Application { config, db_pool, state, limiter: sliding })
}
