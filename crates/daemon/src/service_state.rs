use std::sync::Arc;

use common::clock::SystemClock;
use common::crypto::{Codec, KeyError, KeystoreProvider};
use common::limiter::BruteForceLimiter;
use common::upload::UploadCoordinator;
use object_store::{BlobStore, BlobStoreError, Database};

use crate::service_config::Config;

/// Main service state - owns every long-lived component
#[derive(Clone)]
pub struct State {
    database: Database,
    codec: Arc<Codec>,
    uploads: Arc<UploadCoordinator>,
    limiter: Arc<BruteForceLimiter>,
}

impl State {
    pub async fn from_config(config: &Config) -> Result<Self, StateSetupError> {
        // 1. Setup database
        let database = match config.sqlite_path {
            Some(ref path) => {
                if !path.exists() {
                    return Err(StateSetupError::DatabasePathDoesNotExist);
                }
                tracing::info!(path = %path.display(), "opening metadata database");
                Database::new(path).await?
            }
            None => {
                tracing::info!("using in-memory metadata database");
                Database::in_memory().await?
            }
        };

        // 2. Load the data key up front so a bad keystore fails here
        let mut provider = KeystoreProvider::new(config.settings.clone());
        if let Some(ref fallback) = config.fallback_key_path {
            provider = provider.with_fallback_path(fallback);
        }
        let codec = Arc::new(Codec::new(Arc::new(provider)));
        codec.preload()?;

        // 3. Reconcile the upload directory and start the worker pool
        let blobs = BlobStore::open(&config.upload_dir).await?;
        let uploads = UploadCoordinator::start(
            config.upload,
            codec.clone(),
            blobs,
            Arc::new(database.clone()),
            &SystemClock,
        )
        .await?;

        // 4. Login limiter and its sweeper
        let limiter = BruteForceLimiter::new(config.limiter, Arc::new(SystemClock))
            .map_err(StateSetupError::Sweeper)?;

        Ok(Self {
            database,
            codec,
            uploads: Arc::new(uploads),
            limiter: Arc::new(limiter),
        })
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn codec(&self) -> &Arc<Codec> {
        &self.codec
    }

    pub fn uploads(&self) -> &Arc<UploadCoordinator> {
        &self.uploads
    }

    pub fn limiter(&self) -> &Arc<BruteForceLimiter> {
        &self.limiter
    }

    /// Drain queued uploads, join the workers and stop the sweeper.
    pub async fn shutdown(&self) {
        self.uploads.shutdown().await;
        self.limiter.shutdown();
        tracing::info!("service state shut down");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("Database path does not exist")]
    DatabasePathDoesNotExist,
    #[error("storage error: {0}")]
    Storage(#[from] BlobStoreError),
    #[error("data key unavailable: {0}")]
    Key(#[from] KeyError),
    #[error("failed to start limiter sweeper: {0}")]
    Sweeper(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use common::crypto::{seal_key_file, DataKey, KdfParams};
    use common::limiter::LimiterConfig;
    use common::settings::Settings;
    use common::upload::{FetchError, UploadConfig};

    const PASSPHRASE: &str = "correct horse";

    fn write_key(dir: &std::path::Path) -> std::path::PathBuf {
        let path = dir.join("key.pem");
        let params = KdfParams {
            m_cost: 64,
            t_cost: 1,
            p_cost: 1,
        };
        let key = DataKey::generate().unwrap();
        std::fs::write(&path, seal_key_file(&key, PASSPHRASE, params).unwrap()).unwrap();
        path
    }

    fn config(dir: &std::path::Path, settings: Settings) -> Config {
        Config {
            sqlite_path: None,
            upload_dir: dir.join("uploads"),
            upload: UploadConfig::default(),
            limiter: LimiterConfig {
                sweep_interval: Duration::from_millis(50),
                ..LimiterConfig::default()
            },
            settings,
            fallback_key_path: None,
            log_level: tracing::Level::INFO,
            log_dir: None,
        }
    }

    fn isolated_settings() -> Settings {
        Settings::new().with_env(|_| None)
    }

    #[tokio::test]
    async fn test_state_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = write_key(dir.path());
        let settings = isolated_settings()
            .with_override("KEYSTORE_PATH", key_path.display().to_string())
            .with_override("KEYSTORE_PASSWORD", PASSPHRASE);

        let state = State::from_config(&config(dir.path(), settings))
            .await
            .unwrap();
        assert!(state.codec().is_loaded());
        assert!(state.limiter().is_sweeper_running());

        let id = state
            .uploads()
            .submit(9, "hello.txt", b"hello".to_vec(), 5)
            .await
            .unwrap();
        assert_eq!(
            state.uploads().fetch_plaintext(id.as_str()).await.unwrap(),
            b"hello"
        );
        let row = state.database().get_file(id.as_str()).await.unwrap().unwrap();
        assert_eq!(row.owner_id, 9);

        state.shutdown().await;
        assert!(!state.uploads().is_accepting());
        assert!(!state.limiter().is_sweeper_running());
        assert!(matches!(
            state.uploads().fetch_plaintext("file_0.bin").await,
            Err(FetchError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_passphrase_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = write_key(dir.path());
        let settings = isolated_settings()
            .with_override("KEYSTORE_PATH", key_path.display().to_string())
            .with_override("KEYSTORE_PASSWORD", "wrong");

        assert!(matches!(
            State::from_config(&config(dir.path(), settings)).await,
            Err(StateSetupError::Key(KeyError::Unlock))
        ));
    }

    #[tokio::test]
    async fn test_missing_keystore_settings_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            State::from_config(&config(dir.path(), isolated_settings())).await,
            Err(StateSetupError::Key(KeyError::Settings(_)))
        ));
    }

    #[tokio::test]
    async fn test_missing_database_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), isolated_settings());
        config.sqlite_path = Some(dir.path().join("absent.sqlite"));
        assert!(matches!(
            State::from_config(&config).await,
            Err(StateSetupError::DatabasePathDoesNotExist)
        ));
    }
}
