/// Local database layer
///
/// One SQLite database backs the encrypted DID document store and the
/// local identity record store.
use crate::error::{SyncError, SyncResult};
use sqlx::sqlite::SqlitePool;
use std::path::Path;

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
        }
    }
}

/// Create a SQLite connection pool
pub async fn create_pool(path: &Path, options: DatabaseOptions) -> SyncResult<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(if options.enable_wal {
                    sqlx::sqlite::SqliteJournalMode::Wal
                } else {
                    sqlx::sqlite::SqliteJournalMode::Delete
                })
                .busy_timeout(std::time::Duration::from_secs(5)),
        )
        .await
        .map_err(SyncError::Database)?;

    Ok(pool)
}

/// Create the schema if it does not exist yet
pub async fn ensure_schema(pool: &SqlitePool) -> SyncResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS did_documents (
            did TEXT PRIMARY KEY,
            encrypted_doc TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(SyncError::Database)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS identity_records (
            did TEXT PRIMARY KEY,
            encrypted_payload TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(SyncError::Database)?;

    Ok(())
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> SyncResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(SyncError::Database)?;

    Ok(())
}

/// In-memory pool for tests; a single connection so every query sees
/// the same database
#[cfg(test)]
pub async fn memory_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .unwrap();
    ensure_schema(&pool).await.unwrap();
    pool
}
