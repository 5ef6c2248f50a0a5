//! Error types for the metadata and blob stores.

/// Errors that can occur when working with uploaded blobs or their metadata.
#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Identity that cannot name a file inside the upload directory
    #[error("invalid blob identity: {0:?}")]
    InvalidIdentity(String),

    /// A blob already exists under this identity; blobs are write-once
    #[error("blob already exists: {0}")]
    AlreadyExists(String),

    /// The bytes on disk after fsync do not match what was written
    #[error("blob {identity} failed write verification: expected {expected} bytes, found {actual}")]
    WriteVerification {
        identity: String,
        expected: u64,
        actual: u64,
    },
}

/// Result type alias for blob store operations.
pub type Result<T> = std::result::Result<T, BlobStoreError>;
