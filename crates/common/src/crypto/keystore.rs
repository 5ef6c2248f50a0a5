//! Passphrase-sealed key file
//!
//! The data key lives on disk wrapped under a key-encryption key derived
//! from a passphrase with Argon2id. The file is PEM with tag
//! `STRONGBOX DATA KEY` around:
//!
//! ```text
//! [ version: 1 ][ m_cost: 4 BE ][ t_cost: 4 BE ][ p_cost: 4 BE ][ salt: 16 ][ wrapped key: 40 ]
//! ```
//!
//! AES-KW authenticates the wrapped key, so a wrong passphrase is detected
//! on unwrap.

use aes_kw::KekAes256 as Kek;
use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::Zeroizing;

use super::provider::KeyError;
use super::secret::{DataKey, KEY_SIZE};

pub const PEM_TAG: &str = "STRONGBOX DATA KEY";

const FORMAT_VERSION: u8 = 1;
const SALT_SIZE: usize = 16;
/// AES-KW adds one 8-byte block
const WRAPPED_SIZE: usize = KEY_SIZE + 8;
const HEADER_SIZE: usize = 1 + 4 * 3;
const FILE_SIZE: usize = HEADER_SIZE + SALT_SIZE + WRAPPED_SIZE;

/// Argon2id cost parameters stored alongside the wrapped key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    // OWASP minimum for Argon2id
    fn default() -> Self {
        Self {
            m_cost: 19 * 1024,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

impl KdfParams {
    fn derive(&self, passphrase: &str, salt: &[u8]) -> Result<Zeroizing<[u8; KEY_SIZE]>, KeyError> {
        let params = Params::new(self.m_cost, self.t_cost, self.p_cost, Some(KEY_SIZE))
            .map_err(|e| KeyError::Derivation(format!("invalid argon2 parameters: {}", e)))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut kek = Zeroizing::new([0u8; KEY_SIZE]);
        argon2
            .hash_password_into(passphrase.as_bytes(), salt, kek.as_mut())
            .map_err(|e| KeyError::Derivation(e.to_string()))?;
        Ok(kek)
    }
}

/// Wrap `key` under `passphrase` and render the PEM key file.
pub fn seal_key_file(key: &DataKey, passphrase: &str, params: KdfParams) -> Result<String, KeyError> {
    let mut salt = [0u8; SALT_SIZE];
    getrandom::getrandom(&mut salt).map_err(|e| KeyError::Random(e.to_string()))?;

    let kek = Kek::from(*params.derive(passphrase, &salt)?);
    let wrapped = kek
        .wrap_vec(key.bytes())
        .map_err(|_| KeyError::Malformed("AES-KW wrap error".to_string()))?;

    let mut contents = Vec::with_capacity(FILE_SIZE);
    contents.push(FORMAT_VERSION);
    contents.extend_from_slice(&params.m_cost.to_be_bytes());
    contents.extend_from_slice(&params.t_cost.to_be_bytes());
    contents.extend_from_slice(&params.p_cost.to_be_bytes());
    contents.extend_from_slice(&salt);
    contents.extend_from_slice(&wrapped);

    Ok(pem::encode(&pem::Pem::new(PEM_TAG, contents)))
}

/// Parse a PEM key file and unwrap the data key with `passphrase`.
pub fn open_key_file(pem_str: &str, passphrase: &str) -> Result<DataKey, KeyError> {
    let pem = pem::parse(pem_str).map_err(|e| KeyError::Malformed(e.to_string()))?;
    if pem.tag() != PEM_TAG {
        return Err(KeyError::Malformed(format!(
            "expected PEM tag {:?}, got {:?}",
            PEM_TAG,
            pem.tag()
        )));
    }

    let contents = pem.contents();
    if contents.len() != FILE_SIZE {
        return Err(KeyError::Malformed(format!(
            "expected {} bytes, got {}",
            FILE_SIZE,
            contents.len()
        )));
    }
    if contents[0] != FORMAT_VERSION {
        return Err(KeyError::Malformed(format!(
            "unsupported key file version {}",
            contents[0]
        )));
    }

    let read_u32 = |at: usize| {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&contents[at..at + 4]);
        u32::from_be_bytes(buf)
    };
    let params = KdfParams {
        m_cost: read_u32(1),
        t_cost: read_u32(5),
        p_cost: read_u32(9),
    };
    let salt = &contents[HEADER_SIZE..HEADER_SIZE + SALT_SIZE];
    let wrapped = &contents[HEADER_SIZE + SALT_SIZE..];

    let kek = Kek::from(*params.derive(passphrase, salt)?);
    let unwrapped = Zeroizing::new(kek.unwrap_vec(wrapped).map_err(|_| KeyError::Unlock)?);
    DataKey::from_slice(&unwrapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    // keep tests fast; production files use the default costs
    fn cheap() -> KdfParams {
        KdfParams {
            m_cost: 64,
            t_cost: 1,
            p_cost: 1,
        }
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let key = DataKey::generate().unwrap();
        let file = seal_key_file(&key, "correct horse", cheap()).unwrap();

        assert!(file.contains("BEGIN STRONGBOX DATA KEY"));
        let opened = open_key_file(&file, "correct horse").unwrap();
        assert_eq!(opened.bytes(), key.bytes());
    }

    #[test]
    fn test_wrong_passphrase_is_rejected() {
        let key = DataKey::generate().unwrap();
        let file = seal_key_file(&key, "correct horse", cheap()).unwrap();

        assert!(matches!(
            open_key_file(&file, "battery staple"),
            Err(KeyError::Unlock)
        ));
    }

    #[test]
    fn test_salt_differs_per_seal() {
        let key = DataKey::generate().unwrap();
        let a = seal_key_file(&key, "pw", cheap()).unwrap();
        let b = seal_key_file(&key, "pw", cheap()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_rejects_foreign_pem() {
        let other = pem::encode(&pem::Pem::new("PRIVATE KEY", vec![0u8; FILE_SIZE]));
        assert!(matches!(
            open_key_file(&other, "pw"),
            Err(KeyError::Malformed(_))
        ));
        assert!(matches!(
            open_key_file("not a pem", "pw"),
            Err(KeyError::Malformed(_))
        ));
    }

    #[test]
    fn test_rejects_wrong_length() {
        let short = pem::encode(&pem::Pem::new(PEM_TAG, vec![FORMAT_VERSION; 10]));
        assert!(matches!(
            open_key_file(&short, "pw"),
            Err(KeyError::Malformed(_))
        ));
    }
}
