//! SQLite metadata + filesystem blob storage
//!
//! This crate holds the two persistence collaborators of the upload
//! pipeline:
//!
//! - [`Database`]: SQLite table of upload metadata (owner, display name,
//!   size, creation time) keyed by storage identity
//! - [`BlobStore`]: one write-once file per identity under a fixed upload
//!   directory
//!
//! # Example
//!
//! ```rust,no_run
//! use strongbox_object_store::{BlobStore, Database, FileRecord, MetadataStore};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), strongbox_object_store::BlobStoreError> {
//! let db = Database::new(Path::new("/tmp/strongbox/db.sqlite")).await?;
//! let blobs = BlobStore::open("/tmp/strongbox/uploads").await?;
//!
//! blobs.create_exclusive("file_1.bin", b"ciphertext").await?;
//! let record = FileRecord {
//!     identity: "file_1.bin".into(),
//!     owner_id: 1,
//!     original_name: "notes.txt".into(),
//!     size: 10,
//! };
//! if !db.insert(&record).await? {
//!     blobs.delete("file_1.bin").await?;
//! }
//! # Ok(())
//! # }
//! ```

mod database;
mod error;
mod metadata;
mod storage;

pub use database::{Database, FileRecord, StoredFile};
pub use error::{BlobStoreError, Result};
pub use metadata::MetadataStore;
pub use storage::BlobStore;
