use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use gingga_core::config::{AppConfig, LoadOptions};
use gingga_server::bootstrap;

fn init_logging(config: &AppConfig) {
    use gingga_core::config::LogFormat::*;
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging must be up before bootstrap emits its first event.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    if let Some(limiter) = app.limiter.clone() {
        let period = Duration::from_secs(app.config.rate_limit.window_secs.clamp(60, 3600));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let live = limiter.sweep().await;
                tracing::debug!(
                    event_name = "system.ratelimit.swept",
                    correlation_id = "ratelimit",
                    live_windows = live,
                    "rate limit windows swept"
                );
            }
        });
    }

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "gingga-server listening"
    );

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let router = gingga_server::router(app.state.clone());
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        grace_secs = grace.as_secs(),
        "gingga-server stopping"
    );
    tokio::time::timeout(grace, app.db_pool.close()).await.ok();

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "failed to listen for shutdown signal"
        );
    }
}
