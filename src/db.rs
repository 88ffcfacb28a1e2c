//! SQLite connection setup shared by the CLI commands and the server.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;

/// Open the episode database, creating the file and its parent directory
/// on first use.
///
/// Foreign keys must be on for episode cascade deletes to hold, and the
/// busy timeout covers a `sage ingest` running while the server holds the
/// same file.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.database.path;

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
