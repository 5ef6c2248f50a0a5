use object_store::BlobStoreError;

use super::identity::StorageId;
use crate::crypto::CodecError;

/// Why an upload did not produce a stored file.
///
/// Every variant leaves storage as it was before the submission, except a
/// [`UploadError::Persistence`] that carries `orphaned`.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("upload rejected: {0}")]
    Rejected(String),
    #[error("failed to encrypt upload: {0}")]
    Encryption(#[source] CodecError),
    #[error("failed to write blob {identity}: {source}")]
    Io {
        identity: StorageId,
        #[source]
        source: BlobStoreError,
    },
    /// Identity already on disk; the sequence was seeded below an existing blob
    #[error("blob {0} already exists")]
    AlreadyExists(StorageId),
    /// `orphaned` is set when the blob could not be deleted again and is
    /// still on disk
    #[error("metadata for {identity} was not persisted; {}", rollback_outcome(.orphaned))]
    Persistence {
        identity: StorageId,
        #[source]
        source: Option<BlobStoreError>,
        orphaned: Option<BlobStoreError>,
    },
    #[error("upload coordinator is shut down")]
    ShutDown,
    #[error("upload worker exited before replying")]
    WorkerLost,
}

fn rollback_outcome(orphaned: &Option<BlobStoreError>) -> String {
    match orphaned {
        None => "blob removed".to_string(),
        Some(e) => format!("blob left on disk, removal failed: {}", e),
    }
}

/// Why stored content could not be returned.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Unknown identity, or one whose metadata is not committed
    #[error("no stored file {0:?}")]
    NotFound(String),
    /// Stored bytes failed authentication, or the key is unavailable
    #[error("stored file {identity} could not be decrypted: {source}")]
    Decryption {
        identity: StorageId,
        #[source]
        source: CodecError,
    },
    #[error("failed to read stored file: {0}")]
    Io(#[from] BlobStoreError),
}
