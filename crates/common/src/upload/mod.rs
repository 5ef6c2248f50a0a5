//! Concurrent encrypted uploads
//!
//! [`UploadCoordinator`] accepts submissions from any task and hands each
//! one to a fixed pool of workers. A worker:
//!
//! 1. validates and encrypts the plaintext
//! 2. takes the upload-directory lock, draws the next identity, checks the
//!    path is free and writes the blob create-exclusive (flushed, fsynced,
//!    length-verified)
//! 3. releases the lock and inserts the metadata row
//! 4. deletes the blob again if the metadata store refused or failed
//!
//! Uniqueness comes from the [`IdentitySequence`] alone; the lock only
//! keeps check-then-create atomic. Blobs are write-once, so the read path
//! takes no lock; it serves a blob only once its metadata row exists.

mod error;
mod handle;
mod identity;
mod pipeline;
mod worker;

use std::sync::Arc;

use object_store::{BlobStore, BlobStoreError, MetadataStore};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::crypto::Codec;

pub use error::{FetchError, UploadError};
pub use handle::UploadHandle;
pub use identity::{IdentitySequence, InvalidStorageId, StorageId};
pub use pipeline::MAX_NAME_LEN;

use pipeline::Pipeline;
use worker::{spawn_workers, UploadJob};

/// Pool and request limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadConfig {
    pub pool_size: usize,
    pub max_upload_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            pool_size: 5,
            max_upload_bytes: 5 * 1024 * 1024,
        }
    }
}

/// A file to store on behalf of `owner_id`.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub owner_id: i64,
    pub original_name: String,
    pub plaintext: Vec<u8>,
    /// Size declared by the client; must match `plaintext.len()`
    pub size: u64,
}

/// Outcome of the startup pass over the upload directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Blobs found with a metadata row
    pub kept: usize,
    /// Blobs without metadata, deleted
    pub removed: Vec<String>,
    /// Highest identity sequence seen on disk
    pub highest_sequence: Option<u64>,
}

/// Owns the upload worker pool and the read path.
pub struct UploadCoordinator {
    pipeline: Arc<Pipeline>,
    tx: Mutex<Option<flume::Sender<UploadJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for UploadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadCoordinator")
            .field("upload_dir", &self.pipeline.blobs.root())
            .field("workers", &self.workers.lock().len())
            .field("accepting", &self.tx.lock().is_some())
            .finish()
    }
}

impl UploadCoordinator {
    /// Reconcile the upload directory against the metadata store, seed the
    /// identity sequence and start the worker pool.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(
        config: UploadConfig,
        codec: Arc<Codec>,
        blobs: BlobStore,
        metadata: Arc<dyn MetadataStore>,
        clock: &dyn Clock,
    ) -> Result<Self, BlobStoreError> {
        let reconciliation = reconcile(&blobs, metadata.as_ref()).await?;
        let sequence =
            IdentitySequence::seeded(clock.now_unix_ms(), reconciliation.highest_sequence);

        let pipeline = Arc::new(Pipeline {
            codec,
            blobs,
            metadata,
            sequence,
            fs_lock: tokio::sync::Mutex::new(()),
            max_upload_bytes: config.max_upload_bytes,
        });

        let pool_size = config.pool_size.max(1);
        let (tx, rx) = flume::unbounded();
        let workers = spawn_workers(pool_size, pipeline.clone(), rx);

        info!(
            pool_size,
            upload_dir = %pipeline.blobs.root().display(),
            next_identity = pipeline.sequence.peek(),
            kept = reconciliation.kept,
            removed = reconciliation.removed.len(),
            "upload coordinator started"
        );

        Ok(Self {
            pipeline,
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        })
    }

    /// Queue an upload. The returned handle resolves to the assigned
    /// identity or the reason nothing was stored.
    pub fn submit(
        &self,
        owner_id: i64,
        original_name: impl Into<String>,
        plaintext: Vec<u8>,
        size: u64,
    ) -> UploadHandle {
        self.submit_request(UploadRequest {
            owner_id,
            original_name: original_name.into(),
            plaintext,
            size,
        })
    }

    pub fn submit_request(&self, request: UploadRequest) -> UploadHandle {
        let Some(tx) = self.tx.lock().clone() else {
            return UploadHandle::failed(UploadError::ShutDown);
        };

        let (reply, rx) = oneshot::channel();
        if tx.send(UploadJob { request, reply }).is_err() {
            return UploadHandle::failed(UploadError::ShutDown);
        }
        UploadHandle::new(rx)
    }

    /// Decrypt and return a stored file.
    ///
    /// Only committed uploads are served: a blob whose metadata row is not
    /// (yet) present reads as [`FetchError::NotFound`].
    pub async fn fetch_plaintext(&self, identity: &str) -> Result<Vec<u8>, FetchError> {
        let Some(identity) = StorageId::parse(identity) else {
            return Err(FetchError::NotFound(identity.to_string()));
        };
        if !self.pipeline.metadata.contains(identity.as_str()).await? {
            return Err(FetchError::NotFound(identity.to_string()));
        }
        let Some(sealed) = self.pipeline.blobs.read(identity.as_str()).await? else {
            return Err(FetchError::NotFound(identity.to_string()));
        };

        let codec = self.pipeline.codec.clone();
        let opened = tokio::task::spawn_blocking(move || codec.decrypt(&sealed))
            .await
            .map_err(|e| FetchError::Io(BlobStoreError::Io(std::io::Error::other(e))))?;

        opened.map_err(|source| {
            warn!(identity = %identity, error = %source, "stored file failed decryption");
            FetchError::Decryption { identity, source }
        })
    }

    /// Stop accepting submissions, finish the queued ones and join the
    /// workers. Idempotent.
    pub async fn shutdown(&self) {
        drop(self.tx.lock().take());

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "upload worker ended abnormally");
            }
        }
        info!("upload coordinator stopped");
    }

    pub fn is_accepting(&self) -> bool {
        self.tx.lock().is_some()
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.pipeline.blobs
    }
}

/// Delete blobs that have no metadata row.
///
/// A crash between the blob write and the metadata insert leaves such a
/// blob behind. Only run while no uploads are in flight.
pub async fn reconcile(
    blobs: &BlobStore,
    metadata: &dyn MetadataStore,
) -> Result<Reconciliation, BlobStoreError> {
    let mut result = Reconciliation::default();

    for name in blobs.list().await? {
        // only files this pipeline could have written are candidates
        let Some(id) = StorageId::parse(&name) else {
            continue;
        };
        result.highest_sequence = result.highest_sequence.max(Some(id.sequence()));
        if metadata.contains(&name).await? {
            result.kept += 1;
            continue;
        }
        if blobs.delete(&name).await? {
            warn!(identity = %name, "removed blob with no metadata");
            result.removed.push(name);
        }
    }

    Ok(result)
}
