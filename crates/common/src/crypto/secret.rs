//! Content encryption using AES-256-GCM
//!
//! Every blob is sealed under the single process-wide [`DataKey`] with a
//! fresh random nonce. The sealed layout is
//! `nonce (12 bytes) || ciphertext || auth_tag (16 bytes)`.

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::provider::KeyError;

/// Size of AES-GCM nonce in bytes
pub const NONCE_SIZE: usize = 12;
/// Size of AES-GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;
/// Size of AES-256 key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Errors that can occur during encryption/decryption
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("encryption failed: {0}")]
    Encryption(String),
    /// Tag mismatch: tampered data or the wrong key
    #[error("ciphertext failed authentication")]
    Authentication,
    #[error("ciphertext too short: {len} bytes, need at least {}", NONCE_SIZE + TAG_SIZE)]
    Truncated { len: usize },
    #[error("encryption key unavailable: {0}")]
    Key(#[from] KeyError),
}

/// A 256-bit AES-GCM key.
///
/// The bytes are wiped on drop and never printed. Outside this crate the
/// raw key cannot be read back:
///
/// ```compile_fail
/// let key = common::crypto::DataKey::from([7u8; 32]);
/// let _raw: &[u8] = key.bytes();
/// ```
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DataKey([u8; KEY_SIZE]);

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataKey(<redacted>)")
    }
}

impl From<[u8; KEY_SIZE]> for DataKey {
    fn from(bytes: [u8; KEY_SIZE]) -> Self {
        DataKey(bytes)
    }
}

impl DataKey {
    /// Generate a new random key from the OS CSPRNG
    pub fn generate() -> Result<Self, KeyError> {
        let mut buff = [0; KEY_SIZE];
        getrandom::getrandom(&mut buff).map_err(|e| KeyError::Random(e.to_string()))?;
        Ok(Self(buff))
    }

    /// Create a key from a byte slice
    ///
    /// # Errors
    ///
    /// Returns an error if the slice length is not exactly `KEY_SIZE` bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, KeyError> {
        if data.len() != KEY_SIZE {
            return Err(KeyError::Malformed(format!(
                "invalid key size, expected {}, got {}",
                KEY_SIZE,
                data.len()
            )));
        }
        let mut buff = [0; KEY_SIZE];
        buff.copy_from_slice(data);
        Ok(buff.into())
    }

    /// Get a reference to the key bytes
    pub(crate) fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }

    /// Encrypt data under a fresh random nonce.
    ///
    /// # Errors
    ///
    /// Only fails if the system RNG is unavailable.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut nonce_bytes)
            .map_err(|e| CodecError::Encryption(format!("failed to generate nonce: {}", e)))?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher()
            .encrypt(nonce, plaintext)
            .map_err(|_| CodecError::Encryption("aead encrypt error".to_string()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(nonce.as_ref());
        out.extend_from_slice(ciphertext.as_ref());
        Ok(out)
    }

    /// Decrypt a sealed blob. Nothing is returned unless the whole blob
    /// authenticates.
    ///
    /// # Errors
    ///
    /// - [`CodecError::Truncated`] if the blob cannot hold a nonce and a tag
    /// - [`CodecError::Authentication`] on any tag mismatch
    pub fn open(&self, blob: &[u8]) -> Result<Vec<u8>, CodecError> {
        if blob.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CodecError::Truncated { len: blob.len() });
        }

        let (nonce, ciphertext) = blob.split_at(NONCE_SIZE);
        self.cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CodecError::Authentication)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let key = DataKey::generate().unwrap();
        let sealed = key.seal(b"hello world").unwrap();

        assert_eq!(sealed.len(), NONCE_SIZE + 11 + TAG_SIZE);
        assert_eq!(key.open(&sealed).unwrap(), b"hello world");
    }

    #[test]
    fn test_nonce_is_fresh_per_call() {
        let key = DataKey::generate().unwrap();
        let a = key.seal(b"same").unwrap();
        let b = key.seal(b"same").unwrap();

        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let key = DataKey::generate().unwrap();
        let other = DataKey::generate().unwrap();
        let sealed = key.seal(b"secret").unwrap();

        assert!(matches!(other.open(&sealed), Err(CodecError::Authentication)));
    }

    #[test]
    fn test_short_input_is_truncated() {
        let key = DataKey::generate().unwrap();

        for len in [0, 1, NONCE_SIZE, NONCE_SIZE + TAG_SIZE - 1] {
            let blob = vec![0u8; len];
            assert!(matches!(
                key.open(&blob),
                Err(CodecError::Truncated { len: l }) if l == len
            ));
        }
    }

    #[test]
    fn test_from_slice_rejects_bad_length() {
        assert!(DataKey::from_slice(&[0u8; 16]).is_err());
        assert!(DataKey::from_slice(&[7u8; KEY_SIZE]).is_ok());
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = DataKey::from([0xAB; KEY_SIZE]);
        let rendered = format!("{:?}", key);
        assert_eq!(rendered, "DataKey(<redacted>)");
        assert!(!rendered.to_lowercase().contains("ab, "));
    }
}
