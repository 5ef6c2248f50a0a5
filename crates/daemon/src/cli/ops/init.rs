use std::path::PathBuf;

use clap::Args;
use common::crypto::KdfParams;
use common::settings::{Settings, SettingsError, KEYSTORE_PASSWORD};
use zeroize::Zeroizing;

use strongbox_daemon::service_config::{apply_overrides, ConfigError};
use strongbox_daemon::state::{AppConfig, AppState, StateError, PASSPHRASE_VAR};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Passphrase sealing the data key (defaults to $KEYSTORE_PASSWORD or
    /// `--set KEYSTORE_PASSWORD=...`)
    #[arg(long)]
    pub passphrase: Option<String>,

    /// Upload directory (defaults to <state dir>/uploads)
    #[arg(long)]
    pub upload_dir: Option<PathBuf>,

    /// Number of upload workers
    #[arg(long, default_value_t = 5)]
    pub pool_size: usize,

    /// Directory for log files (logs to stderr only if not set)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] StateError),
    #[error("no passphrase: pass --passphrase or set KEYSTORE_PASSWORD")]
    NoPassphrase,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to resolve passphrase: {0}")]
    Settings(#[from] SettingsError),
}

/// The explicit flag wins, then the environment, then `--set` overrides.
fn resolve_passphrase(
    explicit: Option<&str>,
    settings: &Settings,
) -> Result<Zeroizing<String>, InitError> {
    if let Some(p) = explicit {
        return Ok(Zeroizing::new(p.to_string()));
    }
    settings
        .get(KEYSTORE_PASSWORD)?
        .map(Zeroizing::new)
        .ok_or(InitError::NoPassphrase)
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let settings = apply_overrides(Settings::new(), &ctx.overrides)?;
        let passphrase = resolve_passphrase(self.passphrase.as_deref(), &settings)?;

        let mut config = AppConfig::default();
        config.upload.pool_size = self.pool_size;
        config.upload.upload_dir = self.upload_dir.clone();
        config.logging.log_dir = self.log_dir.clone();

        let state = AppState::init(
            ctx.config_path.clone(),
            Some(config),
            &passphrase,
            KdfParams::default(),
        )?;

        let output = format!(
            "Initialized strongbox directory at: {}\n\
             - Database: {}\n\
             - Key: {}\n\
             - Uploads: {}\n\
             - Config: {}\n\
             - Upload workers: {}\n\
             Set {} (or KEYSTORE_PASSWORD) to unlock the key.",
            state.state_dir.display(),
            state.db_path.display(),
            state.key_path.display(),
            state.uploads_path.display(),
            state.config_path.display(),
            state.config.upload.pool_size,
            PASSPHRASE_VAR,
        );

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env() -> Settings {
        Settings::new().with_env(|_| None)
    }

    #[test]
    fn test_passphrase_from_override() {
        let settings =
            apply_overrides(no_env(), &["KEYSTORE_PASSWORD=hunter2".to_string()]).unwrap();
        assert_eq!(
            resolve_passphrase(None, &settings).unwrap().as_str(),
            "hunter2"
        );
        assert_eq!(
            resolve_passphrase(Some("flag"), &settings).unwrap().as_str(),
            "flag"
        );
    }

    #[test]
    fn test_passphrase_missing() {
        assert!(matches!(
            resolve_passphrase(None, &no_env()),
            Err(InitError::NoPassphrase)
        ));
    }

    #[test]
    fn test_settings_error_is_reported() {
        let settings = no_env()
            .with_toml("[keystore]\npassword = \"${UNSET_PASSPHRASE_VAR}\"\n")
            .unwrap();
        assert!(matches!(
            resolve_passphrase(None, &settings),
            Err(InitError::Settings(SettingsError::Unresolved { .. }))
        ));
    }
}
