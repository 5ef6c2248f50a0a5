use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use object_store::{BlobStoreError, FileRecord, MetadataStore, Result};
use parking_lot::Mutex;

/// Metadata kept in a map. Duplicate identities are refused like the
/// SQLite store refuses them.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    records: Mutex<HashMap<String, FileRecord>>,
    delay: Option<Duration>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every insert.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            records: Mutex::default(),
            delay: Some(delay),
        }
    }

    /// Pre-populate a row, bypassing the delay.
    pub fn seed(&self, record: FileRecord) {
        self.records.lock().insert(record.identity.clone(), record);
    }

    pub fn get(&self, identity: &str) -> Option<FileRecord> {
        self.records.lock().get(identity).cloned()
    }

    pub fn contains_identity(&self, identity: &str) -> bool {
        self.records.lock().contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn insert(&self, record: &FileRecord) -> Result<bool> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut records = self.records.lock();
        if records.contains_key(&record.identity) {
            return Ok(false);
        }
        records.insert(record.identity.clone(), record.clone());
        Ok(true)
    }

    async fn contains(&self, identity: &str) -> Result<bool> {
        Ok(self.contains_identity(identity))
    }
}

/// How [`RejectingMetadataStore`] turns down inserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// `Ok(false)`
    Refuse,
    /// `Err(..)`
    Fail,
}

/// Metadata store whose inserts never succeed. Records what it was asked
/// to insert.
#[derive(Debug)]
pub struct RejectingMetadataStore {
    rejection: Rejection,
    attempted: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl RejectingMetadataStore {
    pub fn new(rejection: Rejection) -> Self {
        Self {
            rejection,
            attempted: Mutex::default(),
            delay: None,
        }
    }

    /// Sleep this long inside every insert before turning it down.
    pub fn with_delay(rejection: Rejection, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(rejection)
        }
    }

    /// Identities whose insert was attempted, in order.
    pub fn attempted(&self) -> Vec<String> {
        self.attempted.lock().clone()
    }
}

#[async_trait]
impl MetadataStore for RejectingMetadataStore {
    async fn insert(&self, record: &FileRecord) -> Result<bool> {
        self.attempted.lock().push(record.identity.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.rejection {
            Rejection::Refuse => Ok(false),
            Rejection::Fail => Err(BlobStoreError::Io(std::io::Error::other(
                "metadata store unavailable",
            ))),
        }
    }

    async fn contains(&self, _identity: &str) -> Result<bool> {
        Ok(false)
    }
}
