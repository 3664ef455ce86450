//! SQLite connection pool for the index database.

use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::time::Duration;

use crate::config::Config;

/// Concurrent request handlers share the pool; ingest holds one connection.
const MAX_CONNECTIONS: u32 = 5;

/// Open the index database at `config.index.db_path()`.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    connect_path(&config.index.db_path()).await
}

/// Open (creating file and parent directories if needed) the database at
/// `db_path` with WAL journaling and foreign keys enforced, so deleting a
/// chunk cascades to its vector.
pub async fn connect_path(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create index directory {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open index database {}", db_path.display()))
}
