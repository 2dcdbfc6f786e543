use std::str::FromStr;
use std::time::Duration;

use sqlx::migrate::MigrateError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use thiserror::Error;
use tracing::info;

use parley_core::config::DatabaseConfig;

use crate::migrations;

pub type DbPool = sqlx::SqlitePool;

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("invalid database url `{url}`: {source}")]
    InvalidUrl { url: String, source: sqlx::Error },
    #[error("database connection failed: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migrate(#[from] MigrateError),
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    pool_options(max_connections, timeout_secs).connect_with(options).await
}

/// Opens the call store described by `config` and applies pending migrations.
pub async fn open(config: &DatabaseConfig) -> Result<DbPool, OpenError> {
    let options = SqliteConnectOptions::from_str(&config.url)
        .map_err(|source| OpenError::InvalidUrl { url: config.url.clone(), source })?
        .create_if_missing(true);

    let pool = pool_options(config.max_connections, config.timeout_secs)
        .connect_with(options)
        .await
        .map_err(OpenError::Connect)?;

    migrations::run_pending(&pool).await?;

    info!(
        event_name = "system.db.opened",
        max_connections = config.max_connections,
        "call store opened and migrated"
    );

    Ok(pool)
}

pub async fn close(pool: DbPool) {
    pool.close().await;
    info!(event_name = "system.db.closed", "call store closed");
}

fn pool_options(max_connections: u32, timeout_secs: u64) -> SqlitePoolOptions {
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
}
