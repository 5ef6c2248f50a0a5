use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use common::limiter::LimiterConfig;
use common::settings::{Settings, SettingsError};
use common::upload::UploadConfig;

use crate::state::AppState;

#[derive(Debug)]
pub struct Config {
    // storage
    /// a path to a sqlite database, if not set then an
    ///  in-memory database will be used
    pub sqlite_path: Option<PathBuf>,
    /// directory holding one encrypted blob per upload
    pub upload_dir: PathBuf,
    pub upload: UploadConfig,

    // login protection
    pub limiter: LimiterConfig,

    // key material
    /// resolves keystore path and passphrase
    pub settings: Settings,
    /// key file tried when the configured one is missing
    pub fallback_key_path: Option<PathBuf>,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stderr only if not set)
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid log level {0:?}")]
    LogLevel(String),
    #[error("invalid override {0:?}, expected KEY=VALUE")]
    Override(String),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl Config {
    /// Build the service configuration from an initialized state directory.
    ///
    /// `overrides` are process-level settings (`KEY=VALUE`) that sit between
    /// the environment and the config file.
    pub fn from_app_state(state: &AppState, overrides: &[String]) -> Result<Self, ConfigError> {
        let settings = apply_overrides(Settings::new().with_file(&state.config_path)?, overrides)?;

        let logging = &state.config.logging;
        let log_level = tracing::Level::from_str(&logging.log_level)
            .map_err(|_| ConfigError::LogLevel(logging.log_level.clone()))?;

        let upload = &state.config.upload;
        let limiter = &state.config.limiter;

        Ok(Self {
            sqlite_path: Some(state.db_path.clone()),
            upload_dir: state.uploads_path.clone(),
            upload: UploadConfig {
                pool_size: upload.pool_size,
                max_upload_bytes: upload.max_upload_bytes,
            },
            limiter: LimiterConfig {
                max_attempts: limiter.max_attempts,
                lockout: Duration::from_secs(limiter.lockout_secs),
                sweep_interval: Duration::from_secs(limiter.sweep_interval_secs),
            },
            settings,
            fallback_key_path: Some(state.key_path.clone()),
            log_level,
            log_dir: logging.log_dir.clone(),
        })
    }
}

/// Layer raw `KEY=VALUE` overrides onto `settings`.
pub fn apply_overrides(
    mut settings: Settings,
    overrides: &[String],
) -> Result<Settings, ConfigError> {
    for raw in overrides {
        let (key, value) = parse_override(raw)?;
        settings = settings.with_override(key, value);
    }
    Ok(settings)
}

pub fn parse_override(raw: &str) -> Result<(&str, &str), ConfigError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value)),
        _ => Err(ConfigError::Override(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_override() {
        assert_eq!(
            parse_override("KEYSTORE_PATH=/etc/key.pem").unwrap(),
            ("KEYSTORE_PATH", "/etc/key.pem")
        );
        assert_eq!(parse_override("A=b=c").unwrap(), ("A", "b=c"));
        assert_eq!(parse_override("EMPTY=").unwrap(), ("EMPTY", ""));
        assert!(parse_override("novalue").is_err());
        assert!(parse_override("=x").is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let settings = apply_overrides(
            Settings::new().with_env(|_| None),
            &["KEYSTORE_PASSWORD=from-flag".to_string()],
        )
        .unwrap();
        assert_eq!(
            settings.get(common::settings::KEYSTORE_PASSWORD).unwrap(),
            Some("from-flag".to_string())
        );

        assert!(matches!(
            apply_overrides(Settings::new(), &["broken".to_string()]),
            Err(ConfigError::Override(_))
        ));
    }
}
