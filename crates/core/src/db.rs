//! Database pool construction and schema migrations

use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

use crate::error::CoreResult;

/// Connect to the configured database and run pending migrations.
pub async fn connect(database_url: &str) -> CoreResult<SqlitePool> {
    // An in-memory database exists per connection, so the pool must not
    // hand out more than one.
    let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    info!(max_connections, "Database pool created");
    Ok(pool)
}

/// Fresh in-memory database, used by tests and local tooling.
pub async fn connect_in_memory() -> CoreResult<SqlitePool> {
    connect("sqlite::memory:").await
}
