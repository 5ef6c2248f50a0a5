//! In-process collaborators for exercising the upload pipeline
//!
//! These stand in for the key file and the SQLite metadata store so
//! tests can force the failure paths (refused or broken metadata writes)
//! that a healthy database never produces.
//!
//! # Example
//!
//! ```rust,ignore
//! use common::testkit::{MemoryMetadataStore, StaticKeyProvider};
//!
//! #[tokio::test]
//! async fn test_upload() -> anyhow::Result<()> {
//!     let dir = tempfile::tempdir()?;
//!     let metadata = Arc::new(MemoryMetadataStore::default());
//!     let codec = Arc::new(Codec::new(Arc::new(StaticKeyProvider::random())));
//!     let blobs = BlobStore::open(dir.path()).await?;
//!
//!     let uploads = UploadCoordinator::start(
//!         UploadConfig::default(), codec, blobs, metadata.clone(), &SystemClock,
//!     ).await?;
//!     let id = uploads.submit(1, "a.txt", b"hi".to_vec(), 2).await?;
//!     assert!(metadata.contains_identity(id.as_str()));
//!     Ok(())
//! }
//! ```
mod keys;
mod metadata;

pub use keys::StaticKeyProvider;
pub use metadata::{MemoryMetadataStore, RejectingMetadataStore, Rejection};
