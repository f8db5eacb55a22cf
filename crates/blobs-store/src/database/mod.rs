//! SQLite metadata store.
//!
//! Holds the content field tables that reference blobs, the template
//! declarations that say which fields are blob-typed, and the `blobs`
//! ledger. Blob payloads written through external storage only leave an
//! empty ledger row here; payloads kept by default persistence live in the
//! same table's `data` column.

mod field_queries;
mod ledger_queries;
mod staging_queries;

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use thiserror::Error;
use tracing::info;

pub use field_queries::{FieldId, FieldTable, TemplateId};
pub use staging_queries::LiveKeyStaging;

/// Database connection pool for blob metadata.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl std::ops::Deref for Database {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

/// Errors that can occur when setting up the database.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),
}

impl Database {
    /// Open (or create) a file-based SQLite database and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Migration(format!("Failed to create database directory: {}", e))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        info!("Blob metadata database initialized at {:?}", path);
        Ok(db)
    }

    /// Create a new in-memory database.
    ///
    /// The single connection is never recycled, since dropping it would
    /// drop the database with it.
    pub async fn in_memory() -> Result<Self, DatabaseError> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        info!("Blob metadata database initialized in-memory");
        Ok(db)
    }

    /// Run database migrations.
    pub(crate) async fn run_migrations(&self) -> Result<(), DatabaseError> {
        // Ledger / default payload table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS blobs (
                id TEXT PRIMARY KEY,
                blob_id TEXT NOT NULL,
                idx INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                data BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_blobs_blob_id ON blobs(blob_id)")
            .execute(&self.pool)
            .await?;

        // Template declarations
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS templates (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                scope TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS template_fields (
                id TEXT PRIMARY KEY,
                template_id TEXT NOT NULL,
                name TEXT NOT NULL,
                is_blob INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Field storage, one table per versioning scope
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS shared_fields (
                item_id TEXT NOT NULL,
                field_id TEXT NOT NULL,
                value TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS unversioned_fields (
                item_id TEXT NOT NULL,
                language TEXT NOT NULL DEFAULT 'en',
                field_id TEXT NOT NULL,
                value TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS versioned_fields (
                item_id TEXT NOT NULL,
                language TEXT NOT NULL DEFAULT 'en',
                version INTEGER NOT NULL DEFAULT 1,
                field_id TEXT NOT NULL,
                value TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS archived_fields (
                archival_id TEXT NOT NULL DEFAULT '',
                item_id TEXT NOT NULL,
                language TEXT NOT NULL DEFAULT 'en',
                version INTEGER NOT NULL DEFAULT 1,
                field_id TEXT NOT NULL,
                value TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for table in FieldTable::ALL {
            let sql = format!(
                "CREATE INDEX IF NOT EXISTS idx_{0}_field_id ON {0}(field_id)",
                table.table_name()
            );
            sqlx::query(&sql).execute(&self.pool).await?;
        }

        Ok(())
    }

    /// Number of rows in the `blobs` table, ledger and payload rows alike.
    pub async fn ledger_row_count(&self) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM blobs")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }

    /// Number of declared templates.
    pub async fn template_count(&self) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM templates")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::in_memory().await.unwrap();
        assert_eq!(db.ledger_row_count().await.unwrap(), 0);
        assert_eq!(db.template_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_database_creates_parent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("meta.db");

        let db = Database::new(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(db.ledger_row_count().await.unwrap(), 0);
    }
}
