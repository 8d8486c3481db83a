//! Per-folder SQLite connection management.
//!
//! Each folder owns exactly one database file at
//! `<folder>/.folder-mcp/embeddings.db`, opened in WAL mode so readers
//! (search, periodic sync) do not block the owning orchestrator's writes.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Returns the on-disk path of a folder's embedding store.
pub fn store_path(folder_root: &Path) -> PathBuf {
    folder_root.join(".folder-mcp").join("embeddings.db")
}

/// Opens (creating if absent) the embedding store database for one folder.
pub async fn connect(folder_root: &Path) -> Result<SqlitePool> {
    let db_path = store_path(folder_root);

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
