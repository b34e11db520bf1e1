use std::time::Duration;

use sqlx::migrate::MigrateError;
use sqlx::sqlite::SqlitePoolOptions;

use crate::migrations;

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    // In-memory databases are per connection; more than one would split the schema.
    let max_connections =
        if is_in_memory(database_url) { 1 } else { max_connections.max(1) };

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
}

/// Single-connection in-memory pool with the schema applied.
pub async fn connect_in_memory() -> Result<DbPool, MigrateError> {
    let pool =
        connect_with_settings("sqlite::memory:", 1, 30).await.map_err(MigrateError::Execute)?;
    migrations::run_pending(&pool).await?;
    Ok(pool)
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}
