//! SQLite database for upload metadata.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow},
    Row,
};

use crate::error::Result;

/// Metadata describing one accepted upload, as handed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Storage identity, also the blob's file name
    pub identity: String,
    pub owner_id: i64,
    /// Display name supplied by the uploader
    pub original_name: String,
    /// Plaintext size in bytes
    pub size: i64,
}

/// A persisted metadata row.
#[derive(Debug, Clone, Serialize)]
pub struct StoredFile {
    pub id: i64,
    pub identity: String,
    pub owner_id: i64,
    pub original_name: String,
    pub size: i64,
    pub created_at: DateTime<Utc>,
}

impl StoredFile {
    fn from_row(row: &SqliteRow) -> Self {
        let created_ms: i64 = row.get("created_at");
        Self {
            id: row.get("id"),
            identity: row.get("identity"),
            owner_id: row.get("owner_id"),
            original_name: row.get("original_name"),
            size: row.get("size"),
            created_at: DateTime::from_timestamp_millis(created_ms).unwrap_or_default(),
        }
    }
}

/// SQLite database connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection from a file path.
    pub async fn new(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Create an in-memory database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Insert a metadata row.
    ///
    /// Returns `false` without writing when a row with the same identity
    /// already exists.
    pub async fn insert_file(&self, record: &FileRecord) -> Result<bool> {
        let now = Utc::now().timestamp_millis();
        let result = sqlx::query(
            r#"
            INSERT INTO files (identity, owner_id, original_name, size, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(identity) DO NOTHING
            "#,
        )
        .bind(&record.identity)
        .bind(record.owner_id)
        .bind(&record.original_name)
        .bind(record.size)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Get a metadata row by identity.
    pub async fn get_file(&self, identity: &str) -> Result<Option<StoredFile>> {
        let row = sqlx::query(
            r#"
            SELECT id, identity, owner_id, original_name, size, created_at
            FROM files
            WHERE identity = ?
            "#,
        )
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(StoredFile::from_row))
    }

    /// Check if a metadata row exists.
    pub async fn has_file(&self, identity: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT 1 FROM files WHERE identity = ?
            "#,
        )
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// List an owner's uploads, newest first.
    pub async fn list_files_for_owner(&self, owner_id: i64) -> Result<Vec<StoredFile>> {
        let rows = sqlx::query(
            r#"
            SELECT id, identity, owner_id, original_name, size, created_at
            FROM files
            WHERE owner_id = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(StoredFile::from_row).collect())
    }

    /// List every upload, newest first.
    pub async fn list_files(&self) -> Result<Vec<StoredFile>> {
        let rows = sqlx::query(
            r#"
            SELECT id, identity, owner_id, original_name, size, created_at
            FROM files
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(StoredFile::from_row).collect())
    }

    /// Delete a metadata row.
    pub async fn delete_file(&self, identity: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM files WHERE identity = ?
            "#,
        )
        .bind(identity)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
impl Database {
    /// Count metadata rows.
    pub async fn count_files(&self) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) as count FROM files
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("count"))
    }
}
