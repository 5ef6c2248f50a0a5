//! The metadata collaborator seen by the upload pipeline.

use async_trait::async_trait;

use crate::database::{Database, FileRecord};
use crate::error::Result;

/// Durable home for upload metadata.
///
/// `insert` reports a refused write as `Ok(false)` and a broken store as
/// `Err`; callers treat both as a failed upload.
#[async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    async fn insert(&self, record: &FileRecord) -> Result<bool>;

    async fn contains(&self, identity: &str) -> Result<bool>;
}

#[async_trait]
impl MetadataStore for Database {
    async fn insert(&self, record: &FileRecord) -> Result<bool> {
        self.insert_file(record).await
    }

    async fn contains(&self, identity: &str) -> Result<bool> {
        self.has_file(identity).await
    }
}
