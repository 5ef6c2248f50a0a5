//! Shared test utilities for upload integration tests
#![allow(dead_code)]

use std::sync::Arc;

use ::common::clock::SystemClock;
use ::common::crypto::Codec;
use ::common::testkit::StaticKeyProvider;
use ::common::upload::{UploadConfig, UploadCoordinator};
use object_store::{BlobStore, MetadataStore};
use tempfile::TempDir;

pub struct TestEnv {
    pub uploads: UploadCoordinator,
    pub blobs: BlobStore,
    pub keys: Arc<StaticKeyProvider>,
    pub dir: TempDir,
}

/// Start a coordinator over a fresh upload directory.
pub async fn setup_uploads(config: UploadConfig, metadata: Arc<dyn MetadataStore>) -> TestEnv {
    let dir = TempDir::new().unwrap();
    setup_uploads_in(dir, config, metadata).await
}

/// Start a coordinator over an existing directory (its `uploads/` subdir).
pub async fn setup_uploads_in(
    dir: TempDir,
    config: UploadConfig,
    metadata: Arc<dyn MetadataStore>,
) -> TestEnv {
    let keys = Arc::new(StaticKeyProvider::from_bytes([42u8; 32]));
    let codec = Arc::new(Codec::new(keys.clone()));
    let blobs = BlobStore::open(dir.path().join("uploads")).await.unwrap();

    let uploads = UploadCoordinator::start(config, codec, blobs.clone(), metadata, &SystemClock)
        .await
        .unwrap();

    TestEnv {
        uploads,
        blobs,
        keys,
        dir,
    }
}

/// Deterministic, distinguishable content for upload `i`.
pub fn payload(i: usize, len: usize) -> Vec<u8> {
    let mut data = format!("upload-{}:", i).into_bytes();
    data.extend((0..len).map(|j| ((i * 31 + j) % 251) as u8));
    data
}
