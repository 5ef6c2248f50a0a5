use std::path::PathBuf;

use zeroize::Zeroizing;

use super::keystore::open_key_file;
use super::secret::DataKey;
use crate::settings::{Settings, SettingsError, KEYSTORE_PASSWORD, KEYSTORE_PATH};

/// Failure to obtain the data key. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("keystore configuration error: {0}")]
    Settings(#[from] SettingsError),
    #[error("failed to read key file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed key file: {0}")]
    Malformed(String),
    /// Wrong passphrase, or the wrapped key was altered
    #[error("key file could not be unlocked")]
    Unlock,
    #[error("key derivation failed: {0}")]
    Derivation(String),
    #[error("random source unavailable: {0}")]
    Random(String),
}

/// Source of the single data key used for every blob.
pub trait KeyProvider: Send + Sync + 'static {
    fn load_key(&self) -> Result<DataKey, KeyError>;
}

/// Loads the data key from a passphrase-sealed key file.
///
/// Path and passphrase are resolved from [`Settings`] at load time, so a
/// provider can be built before the environment is complete.
#[derive(Debug, Clone)]
pub struct KeystoreProvider {
    settings: Settings,
    fallback_path: Option<PathBuf>,
}

impl KeystoreProvider {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            fallback_path: None,
        }
    }

    /// Key file to try when the configured path does not exist.
    pub fn with_fallback_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.fallback_path = Some(path.into());
        self
    }

    fn resolve_path(&self) -> Result<PathBuf, KeyError> {
        let configured = PathBuf::from(self.settings.require(KEYSTORE_PATH)?);
        if configured.exists() {
            return Ok(configured);
        }
        match &self.fallback_path {
            Some(fallback) if fallback.exists() => {
                tracing::info!(
                    configured = %configured.display(),
                    fallback = %fallback.display(),
                    "key file not found at configured path, using fallback"
                );
                Ok(fallback.clone())
            }
            _ => Ok(configured),
        }
    }
}

impl KeyProvider for KeystoreProvider {
    fn load_key(&self) -> Result<DataKey, KeyError> {
        let path = self.resolve_path()?;
        let passphrase = Zeroizing::new(self.settings.require(KEYSTORE_PASSWORD)?);

        let contents = std::fs::read_to_string(&path).map_err(|source| KeyError::Read {
            path: path.clone(),
            source,
        })?;
        let key = open_key_file(&contents, &passphrase)?;

        tracing::info!(path = %path.display(), "data key loaded from key file");
        Ok(key)
    }
}
