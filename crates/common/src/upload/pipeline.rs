//! One upload, start to finish.

use std::sync::Arc;

use object_store::{BlobStore, BlobStoreError, FileRecord, MetadataStore};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::error::UploadError;
use super::identity::{IdentitySequence, StorageId};
use super::UploadRequest;
use crate::crypto::Codec;

/// Longest display name kept; longer names are truncated.
pub const MAX_NAME_LEN: usize = 255;

pub(crate) struct Pipeline {
    pub codec: Arc<Codec>,
    pub blobs: BlobStore,
    pub metadata: Arc<dyn MetadataStore>,
    pub sequence: IdentitySequence,
    /// Serialises check-then-create on the upload directory. Waiters are
    /// granted the lock in arrival order.
    pub fs_lock: Mutex<()>,
    pub max_upload_bytes: usize,
}

impl Pipeline {
    pub async fn process(&self, request: UploadRequest) -> Result<StorageId, UploadError> {
        let original_name = validate(&request, self.max_upload_bytes)?;
        let owner_id = request.owner_id;
        let size = request.plaintext.len();

        let sealed = self.encrypt(request.plaintext).await?;
        let identity = self.write_blob(&sealed).await?;

        // from here until the row is committed the blob must not outlive a
        // panic or a dropped future
        let guard = UncommittedBlob {
            blobs: &self.blobs,
            identity: &identity,
            armed: true,
        };

        // metadata happens outside the fs lock
        let record = FileRecord {
            identity: identity.to_string(),
            owner_id,
            original_name,
            size: size as i64,
        };
        let source = match self.metadata.insert(&record).await {
            Ok(true) => {
                guard.disarm();
                info!(identity = %identity, owner_id, size, "upload stored");
                return Ok(identity);
            }
            Ok(false) => None,
            Err(e) => Some(e),
        };

        guard.disarm();
        let orphaned = self.rollback(&identity).await.err();
        Err(UploadError::Persistence {
            identity,
            source,
            orphaned,
        })
    }

    async fn encrypt(&self, plaintext: Vec<u8>) -> Result<Vec<u8>, UploadError> {
        let codec = self.codec.clone();
        tokio::task::spawn_blocking(move || codec.encrypt(&plaintext))
            .await
            .map_err(|_| UploadError::WorkerLost)?
            .map_err(UploadError::Encryption)
    }

    async fn write_blob(&self, sealed: &[u8]) -> Result<StorageId, UploadError> {
        let _guard = self.fs_lock.lock().await;
        let identity = self.sequence.next();

        let exists = self
            .blobs
            .exists(identity.as_str())
            .await
            .map_err(|source| UploadError::Io {
                identity: identity.clone(),
                source,
            })?;
        if exists {
            warn!(identity = %identity, "identity already present on disk, refusing to overwrite");
            return Err(UploadError::AlreadyExists(identity));
        }

        match self.blobs.create_exclusive(identity.as_str(), sealed).await {
            Ok(written) => {
                debug!(identity = %identity, written, "blob committed");
                Ok(identity)
            }
            Err(BlobStoreError::AlreadyExists(_)) => Err(UploadError::AlreadyExists(identity)),
            Err(source) => Err(UploadError::Io { identity, source }),
        }
    }

    async fn rollback(&self, identity: &StorageId) -> Result<(), BlobStoreError> {
        match self.blobs.delete(identity.as_str()).await {
            Ok(_) => {
                warn!(identity = %identity, "metadata not persisted, blob rolled back");
                Ok(())
            }
            Err(e) => {
                error!(
                    identity = %identity,
                    error = %e,
                    "metadata not persisted and blob rollback failed"
                );
                Err(e)
            }
        }
    }
}

/// Deletes a written blob when dropped while armed.
struct UncommittedBlob<'a> {
    blobs: &'a BlobStore,
    identity: &'a StorageId,
    armed: bool,
}

impl UncommittedBlob<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for UncommittedBlob<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.blobs.delete_blocking(self.identity.as_str()) {
            Ok(_) => warn!(identity = %self.identity, "upload abandoned, blob removed"),
            Err(e) => error!(
                identity = %self.identity,
                error = %e,
                "upload abandoned and blob removal failed"
            ),
        }
    }
}

fn validate(request: &UploadRequest, max_upload_bytes: usize) -> Result<String, UploadError> {
    let received = request.plaintext.len();
    if request.size != received as u64 {
        return Err(UploadError::Rejected(format!(
            "declared size {} does not match {} bytes received",
            request.size, received
        )));
    }
    if received > max_upload_bytes {
        return Err(UploadError::Rejected(format!(
            "upload of {} bytes exceeds the {} byte limit",
            received, max_upload_bytes
        )));
    }

    let name = request.original_name.trim();
    if name.is_empty() {
        return Err(UploadError::Rejected("original name is empty".to_string()));
    }
    Ok(name.chars().take(MAX_NAME_LEN).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, plaintext: &[u8], size: u64) -> UploadRequest {
        UploadRequest {
            owner_id: 1,
            original_name: name.to_string(),
            plaintext: plaintext.to_vec(),
            size,
        }
    }

    #[test]
    fn test_validate_accepts_and_trims() {
        let name = validate(&request("  notes.txt ", b"abc", 3), 10).unwrap();
        assert_eq!(name, "notes.txt");
    }

    #[test]
    fn test_validate_truncates_long_names() {
        let long = "é".repeat(300);
        let name = validate(&request(&long, b"", 0), 10).unwrap();
        assert_eq!(name.chars().count(), MAX_NAME_LEN);
    }

    #[test]
    fn test_validate_rejections() {
        assert!(matches!(
            validate(&request("a", b"abc", 4), 10),
            Err(UploadError::Rejected(_))
        ));
        assert!(matches!(
            validate(&request("a", &[0u8; 11], 11), 10),
            Err(UploadError::Rejected(_))
        ));
        assert!(matches!(
            validate(&request("   ", b"abc", 3), 10),
            Err(UploadError::Rejected(_))
        ));
        assert!(validate(&request("a", &[0u8; 10], 10), 10).is_ok());
    }
}
