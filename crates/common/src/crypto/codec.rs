use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use super::provider::{KeyError, KeyProvider};
use super::secret::{CodecError, DataKey};

/// Authenticated encryption under a lazily loaded data key.
///
/// The key is fetched from the provider on first use, exactly once even
/// under concurrent first calls, and cached for the codec's lifetime. A
/// failed load is not cached; the next call retries.
pub struct Codec {
    provider: Arc<dyn KeyProvider>,
    key: OnceLock<DataKey>,
    loading: Mutex<()>,
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("loaded", &self.key.get().is_some())
            .finish()
    }
}

impl Codec {
    pub fn new(provider: Arc<dyn KeyProvider>) -> Self {
        Self {
            provider,
            key: OnceLock::new(),
            loading: Mutex::new(()),
        }
    }

    fn key(&self) -> Result<&DataKey, KeyError> {
        if let Some(key) = self.key.get() {
            return Ok(key);
        }

        let _guard = self.loading.lock();
        if let Some(key) = self.key.get() {
            return Ok(key);
        }
        let key = self.provider.load_key()?;
        tracing::debug!("data key cached");
        Ok(self.key.get_or_init(|| key))
    }

    /// Load the key now so configuration errors surface at startup.
    pub fn preload(&self) -> Result<(), KeyError> {
        self.key().map(|_| ())
    }

    pub fn is_loaded(&self) -> bool {
        self.key.get().is_some()
    }

    /// Encrypt to `[nonce][ciphertext || tag]`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
        self.key()?.seal(plaintext)
    }

    /// Decrypt a blob produced by [`Codec::encrypt`].
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, CodecError> {
        self.key()?.open(blob)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::crypto::secret::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

    struct CountingProvider {
        key: [u8; KEY_SIZE],
        loads: AtomicUsize,
    }

    impl KeyProvider for CountingProvider {
        fn load_key(&self) -> Result<DataKey, KeyError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            Ok(DataKey::from(self.key))
        }
    }

    struct FailingProvider;

    impl KeyProvider for FailingProvider {
        fn load_key(&self) -> Result<DataKey, KeyError> {
            Err(KeyError::Unlock)
        }
    }

    fn counting() -> Arc<CountingProvider> {
        Arc::new(CountingProvider {
            key: [3u8; KEY_SIZE],
            loads: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_roundtrip_empty_and_large() {
        let codec = Codec::new(counting());

        let empty = codec.encrypt(b"").unwrap();
        assert_eq!(empty.len(), NONCE_SIZE + TAG_SIZE);
        assert!(codec.decrypt(&empty).unwrap().is_empty());

        let large: Vec<u8> = (0..5 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
        let sealed = codec.encrypt(&large).unwrap();
        assert_eq!(codec.decrypt(&sealed).unwrap(), large);
    }

    #[test]
    fn test_every_single_bit_flip_is_detected() {
        let codec = Codec::new(counting());
        let sealed = codec.encrypt(b"attack at dawn").unwrap();

        for byte in 0..sealed.len() {
            for bit in 0..8 {
                let mut tampered = sealed.clone();
                tampered[byte] ^= 1 << bit;
                assert!(
                    matches!(codec.decrypt(&tampered), Err(CodecError::Authentication)),
                    "flip at byte {} bit {} not detected",
                    byte,
                    bit
                );
            }
        }
    }

    #[test]
    fn test_key_loads_once_under_contention() {
        let provider = counting();
        let codec = Arc::new(Codec::new(provider.clone()));
        assert!(!codec.is_loaded());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let codec = codec.clone();
                std::thread::spawn(move || codec.encrypt(b"x").unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(provider.loads.load(Ordering::SeqCst), 1);
        assert!(codec.is_loaded());
    }

    #[test]
    fn test_failed_load_is_reported_and_retried() {
        let codec = Codec::new(Arc::new(FailingProvider));
        assert!(matches!(
            codec.encrypt(b"x"),
            Err(CodecError::Key(KeyError::Unlock))
        ));
        assert!(codec.preload().is_err());
        assert!(!codec.is_loaded());
    }
}
