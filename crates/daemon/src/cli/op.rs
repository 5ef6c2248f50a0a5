use std::error::Error;
use std::path::PathBuf;

use strongbox_daemon::service_config::ConfigError;
use strongbox_daemon::service_state::StateSetupError;
use strongbox_daemon::state::{AppState, StateError};
use strongbox_daemon::{start_service, Service, ServiceConfig};

#[derive(Debug, thiserror::Error)]
pub enum ServiceStartError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Setup(#[from] StateSetupError),
}

#[derive(Debug, Clone)]
pub struct OpContext {
    /// Optional custom state path (defaults to ~/.strongbox)
    pub config_path: Option<PathBuf>,
    /// Raw `KEY=VALUE` process overrides
    pub overrides: Vec<String>,
}

impl OpContext {
    pub fn new(config_path: Option<PathBuf>, overrides: Vec<String>) -> Self {
        Self {
            config_path,
            overrides,
        }
    }

    /// Load the state directory and start the service over it.
    pub async fn start_service(&self) -> Result<Service, ServiceStartError> {
        let state = AppState::load(self.config_path.clone())?;
        let config = ServiceConfig::from_app_state(&state, &self.overrides)?;
        Ok(start_service(&config).await?)
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::cli::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::cli::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}
