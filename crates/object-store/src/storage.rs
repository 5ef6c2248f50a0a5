//! Write-once blob storage on the local filesystem.
//!
//! Each blob is a single file named by its identity directly under the
//! upload directory. Files are created exclusively and never rewritten.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{BlobStoreError, Result};

const MAX_IDENTITY_LEN: usize = 255;

/// Filesystem-backed blob storage rooted at one directory.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Open the store, creating the upload directory if it is missing.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an identity to its file, refusing anything that could leave
    /// the upload directory.
    fn blob_path(&self, identity: &str) -> Result<PathBuf> {
        if !is_valid_identity(identity) {
            return Err(BlobStoreError::InvalidIdentity(identity.to_string()));
        }
        Ok(self.root.join(identity))
    }

    /// Write a new blob with create-exclusive semantics.
    ///
    /// The data is flushed and fsynced, then the on-disk length is checked
    /// against the input. On any failure after the file was created the
    /// partial file is removed before the error is returned.
    pub async fn create_exclusive(&self, identity: &str, data: &[u8]) -> Result<u64> {
        let path = self.blob_path(identity)?;

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(BlobStoreError::AlreadyExists(identity.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let written: std::io::Result<()> = async {
            file.write_all(data).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        drop(file);

        if let Err(e) = written {
            self.discard_partial(identity, &path).await;
            return Err(e.into());
        }

        let expected = data.len() as u64;
        let actual = match fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                self.discard_partial(identity, &path).await;
                return Err(e.into());
            }
        };
        if actual != expected {
            self.discard_partial(identity, &path).await;
            return Err(BlobStoreError::WriteVerification {
                identity: identity.to_string(),
                expected,
                actual,
            });
        }

        debug!(identity = %identity, size = actual, "blob written");
        Ok(actual)
    }

    async fn discard_partial(&self, identity: &str, path: &Path) {
        if let Err(e) = fs::remove_file(path).await {
            if e.kind() != ErrorKind::NotFound {
                warn!(identity = %identity, error = %e, "failed to remove partial blob");
            }
        }
    }

    /// Check whether a blob exists.
    pub async fn exists(&self, identity: &str) -> Result<bool> {
        let path = self.blob_path(identity)?;
        Ok(fs::try_exists(&path).await?)
    }

    /// Read a blob, `None` if absent.
    pub async fn read(&self, identity: &str) -> Result<Option<Vec<u8>>> {
        let path = self.blob_path(identity)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a blob. Returns whether a file was removed.
    pub async fn delete(&self, identity: &str) -> Result<bool> {
        let path = self.blob_path(identity)?;
        // Ignore NotFound errors - the blob may already be deleted
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Blocking variant of [`BlobStore::delete`], for cleanup paths that
    /// cannot await (e.g. `Drop`).
    pub fn delete_blocking(&self, identity: &str) -> Result<bool> {
        let path = self.blob_path(identity)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// List the identities of all stored blobs.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut identities = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if is_valid_identity(name) {
                    identities.push(name.to_string());
                }
            }
        }
        identities.sort();
        Ok(identities)
    }
}

fn is_valid_identity(identity: &str) -> bool {
    !identity.is_empty()
        && identity.len() <= MAX_IDENTITY_LEN
        && !identity.starts_with('.')
        && identity
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path().join("uploads")).await.unwrap();

        let size = store.create_exclusive("file_1.bin", b"hello").await.unwrap();
        assert_eq!(size, 5);
        assert!(store.exists("file_1.bin").await.unwrap());
        assert_eq!(
            store.read("file_1.bin").await.unwrap(),
            Some(b"hello".to_vec())
        );
    }

    #[tokio::test]
    async fn test_create_exclusive_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path()).await.unwrap();

        store.create_exclusive("file_1.bin", b"first").await.unwrap();
        let err = store
            .create_exclusive("file_1.bin", b"second")
            .await
            .unwrap_err();
        assert!(matches!(err, BlobStoreError::AlreadyExists(_)));
        assert_eq!(
            store.read("file_1.bin").await.unwrap(),
            Some(b"first".to_vec())
        );
    }

    #[tokio::test]
    async fn test_empty_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path()).await.unwrap();

        assert_eq!(store.create_exclusive("file_0.bin", b"").await.unwrap(), 0);
        assert_eq!(store.read("file_0.bin").await.unwrap(), Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_missing_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path()).await.unwrap();

        assert_eq!(store.read("file_404.bin").await.unwrap(), None);
        assert!(!store.exists("file_404.bin").await.unwrap());
        assert!(!store.delete("file_404.bin").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path()).await.unwrap();

        store.create_exclusive("file_2.bin", b"data").await.unwrap();
        assert!(store.delete("file_2.bin").await.unwrap());
        assert!(!store.exists("file_2.bin").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path()).await.unwrap();

        store.create_exclusive("file_3.bin", b"data").await.unwrap();
        assert!(store.delete_blocking("file_3.bin").unwrap());
        assert!(!store.delete_blocking("file_3.bin").unwrap());
        assert!(store.delete_blocking("../file_3.bin").is_err());
    }

    #[tokio::test]
    async fn test_rejects_escaping_identities() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path().join("uploads")).await.unwrap();

        for bad in ["", "..", "../escape", "a/b", "a\\b", ".hidden"] {
            let err = store.create_exclusive(bad, b"x").await.unwrap_err();
            assert!(
                matches!(err, BlobStoreError::InvalidIdentity(_)),
                "{:?} accepted",
                bad
            );
            assert!(store.read(bad).await.is_err());
        }
        assert!(!dir.path().join("escape").exists());
    }

    #[tokio::test]
    async fn test_list_skips_foreign_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path()).await.unwrap();

        store.create_exclusive("file_2.bin", b"b").await.unwrap();
        store.create_exclusive("file_1.bin", b"a").await.unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();
        std::fs::write(dir.path().join(".tmp"), b"junk").unwrap();

        assert_eq!(
            store.list().await.unwrap(),
            vec!["file_1.bin".to_string(), "file_2.bin".to_string()]
        );
    }
}
