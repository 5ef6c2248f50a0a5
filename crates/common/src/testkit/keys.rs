use std::sync::atomic::{AtomicUsize, Ordering};

use crate::crypto::{DataKey, KeyError, KeyProvider, KEY_SIZE};

/// Hands out a fixed key and counts how often it was asked.
#[derive(Debug)]
pub struct StaticKeyProvider {
    key: DataKey,
    loads: AtomicUsize,
}

impl StaticKeyProvider {
    pub fn new(key: DataKey) -> Self {
        Self {
            key,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self::new(DataKey::from(bytes))
    }

    /// A provider with a fresh random key.
    pub fn random() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        // test-only helper; a broken RNG should fail the test loudly
        getrandom::getrandom(&mut bytes).expect("system RNG unavailable");
        Self::from_bytes(bytes)
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl KeyProvider for StaticKeyProvider {
    fn load_key(&self) -> Result<DataKey, KeyError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.key.clone())
    }
}
