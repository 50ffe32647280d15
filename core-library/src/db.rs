//! # Relational File Connections
//!
//! Opens the portable SQLite file the relational adapter reads and writes.
//!
//! ## Features
//!
//! - **Single connection**: the file is written by one transaction and then
//!   zipped, so there is never a second writer
//! - **Rollback journal**: no `-wal`/`-shm` side files that would have to be
//!   packaged alongside the database
//! - **Soft references**: foreign keys are not enforced; join rows may point
//!   at entities that are not part of the same snapshot
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_library::db::{DatabaseConfig, open_pool};
//!
//! let pool = open_pool(DatabaseConfig::new("/tmp/song.db")).await?;
//! let exists = table_exists(&pool, "song").await?;
//! pool.close().await;
//! ```

use crate::Result;
use core_runtime::logging::strip_path;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Connection settings for a relational backup file
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,

    /// Create the file when it does not exist (writes) or fail (reads)
    pub create_if_missing: bool,

    /// How long SQLite waits on a locked file before giving up
    pub busy_timeout: Duration,

    pub statement_cache_capacity: usize,
}

impl DatabaseConfig {
    /// Configuration for writing a fresh file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            create_if_missing: true,
            busy_timeout: Duration::from_secs(5),
            statement_cache_capacity: 32,
        }
    }

    /// Configuration for reading an existing file
    pub fn read_only(path: impl Into<PathBuf>) -> Self {
        Self {
            create_if_missing: false,
            ..Self::new(path)
        }
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn statement_cache_capacity(mut self, capacity: usize) -> Self {
        self.statement_cache_capacity = capacity;
        self
    }
}

/// Open a one-connection pool on the configured file.
///
/// Callers should `close()` the pool when done so the file handle is
/// released before the file is moved or zipped.
pub async fn open_pool(config: DatabaseConfig) -> Result<Pool<Sqlite>> {
    debug!(path = %strip_path(&config.path.to_string_lossy()), create = config.create_if_missing, "Opening relational file");

    let options = SqliteConnectOptions::new()
        .filename(&config.path)
        .create_if_missing(config.create_if_missing)
        .journal_mode(SqliteJournalMode::Delete)
        .synchronous(SqliteSynchronous::Full)
        .foreign_keys(false)
        .busy_timeout(config.busy_timeout)
        .statement_cache_capacity(config.statement_cache_capacity);

    let pool = SqlitePoolOptions::new()
        .min_connections(0)
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| {
            warn!(error = %e, path = %strip_path(&config.path.to_string_lossy()), "Failed to open relational file");
            e
        })?;

    Ok(pool)
}

/// Whether a table named `table` exists.
pub async fn table_exists<'e, E>(executor: E, table: &str) -> Result<bool>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let found: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_optional(executor)
            .await?;
    Ok(found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_file_without_foreign_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("song.db");
        let pool = open_pool(DatabaseConfig::new(&path)).await.unwrap();

        let (fk,): (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(fk, 0);

        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "delete");

        pool.close().await;
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_read_only_config_does_not_create() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.db");

        assert!(open_pool(DatabaseConfig::read_only(&path)).await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_table_exists() {
        let dir = TempDir::new().unwrap();
        let pool = open_pool(DatabaseConfig::new(dir.path().join("t.db")))
            .await
            .unwrap();
        sqlx::query("CREATE TABLE song (id TEXT PRIMARY KEY)")
            .execute(&pool)
            .await
            .unwrap();

        assert!(table_exists(&pool, "song").await.unwrap());
        assert!(!table_exists(&pool, "event").await.unwrap());
        pool.close().await;
    }
}
