use std::{fs, path::PathBuf};

use common::crypto::{seal_key_file, DataKey, KdfParams, KeyError};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "strongbox";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_FILE_NAME: &str = "db.sqlite";
pub const KEY_FILE_NAME: &str = "key.pem";
pub const UPLOADS_DIR_NAME: &str = "uploads";

/// Environment variable the generated config reads the passphrase from.
pub const PASSPHRASE_VAR: &str = "STRONGBOX_PASSPHRASE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub upload: UploadSection,
    #[serde(default)]
    pub limiter: LimiterSection,
    #[serde(default)]
    pub logging: LoggingSection,
    /// Read raw through `Settings` so `${VAR:default}` references resolve
    /// at key load time
    #[serde(default)]
    pub keystore: KeystoreSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSection {
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Defaults to `<state dir>/uploads`
    #[serde(default)]
    pub upload_dir: Option<PathBuf>,
}

fn default_pool_size() -> usize {
    5
}

fn default_max_upload_bytes() -> usize {
    5 * 1024 * 1024
}

impl Default for UploadSection {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            max_upload_bytes: default_max_upload_bytes(),
            upload_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterSection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_lockout_secs")]
    pub lockout_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_lockout_secs() -> u64 {
    15 * 60
}

fn default_sweep_interval_secs() -> u64 {
    60 * 60
}

impl Default for LimiterSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            lockout_secs: default_lockout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Daily rolling log files are written here when set
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeystoreSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the state directory (~/.strongbox)
    pub state_dir: PathBuf,
    /// Path to the SQLite database
    pub db_path: PathBuf,
    /// Path to the sealed data key
    pub key_path: PathBuf,
    /// Path to the upload directory
    pub uploads_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the state directory path (custom or default ~/.strongbox)
    pub fn state_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new state directory with a freshly generated data key
    /// sealed under `passphrase`.
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
        passphrase: &str,
        kdf: KdfParams,
    ) -> Result<Self, StateError> {
        let state_dir = Self::state_dir(custom_path)?;

        if state_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }

        fs::create_dir_all(&state_dir)?;

        let key_path = state_dir.join(KEY_FILE_NAME);
        let key = DataKey::generate()?;
        fs::write(&key_path, seal_key_file(&key, passphrase, kdf)?)?;

        let mut config = config.unwrap_or_default();
        if config.keystore.path.is_none() {
            config.keystore.path = Some(key_path.display().to_string());
        }
        if config.keystore.password.is_none() {
            config.keystore.password = Some(format!("${{{}}}", PASSPHRASE_VAR));
        }

        let uploads_path = config
            .upload
            .upload_dir
            .clone()
            .unwrap_or_else(|| state_dir.join(UPLOADS_DIR_NAME));
        fs::create_dir_all(&uploads_path)?;

        let config_path = state_dir.join(CONFIG_FILE_NAME);
        fs::write(&config_path, toml::to_string_pretty(&config)?)?;

        // schema is created by the service on first connect
        let db_path = state_dir.join(DB_FILE_NAME);
        fs::write(&db_path, "")?;

        Ok(Self {
            state_dir,
            db_path,
            key_path,
            uploads_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the state directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let state_dir = Self::state_dir(custom_path)?;

        if !state_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let db_path = state_dir.join(DB_FILE_NAME);
        let key_path = state_dir.join(KEY_FILE_NAME);
        let config_path = state_dir.join(CONFIG_FILE_NAME);

        if !db_path.exists() {
            return Err(StateError::MissingFile(DB_FILE_NAME.to_string()));
        }
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        let uploads_path = config
            .upload
            .upload_dir
            .clone()
            .unwrap_or_else(|| state_dir.join(UPLOADS_DIR_NAME));

        Ok(Self {
            state_dir,
            db_path,
            key_path,
            uploads_path,
            config_path,
            config,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("strongbox directory not initialized. Run 'strongbox init' first")]
    NotInitialized,

    #[error("strongbox directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("key error: {0}")]
    Key(#[from] KeyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
