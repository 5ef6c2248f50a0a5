pub mod utils;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::service_state::StateSetupError;
use crate::{ServiceConfig, ServiceState};

/// A started service. Keeps the log writers alive until dropped.
pub struct Service {
    state: ServiceState,
    _guards: Vec<tracing_appender::non_blocking::WorkerGuard>,
}

impl Service {
    pub fn state(&self) -> &ServiceState {
        &self.state
    }

    /// Finish queued uploads and stop background work.
    pub async fn shutdown(self) {
        self.state.shutdown().await;
    }
}

/// Initialize logging, panic handler, and build info reporting.
/// Returns guards that must be kept alive for the duration of the program.
///
/// Console output goes to stderr; stdout carries command output.
pub fn init_logging(
    service_config: &ServiceConfig,
) -> Vec<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::fmt::format::FmtSpan;

    let mut guards = Vec::new();

    let (stderr_writer, stderr_guard) = tracing_appender::non_blocking(std::io::stderr());
    guards.push(stderr_guard);

    let stderr_env_filter = EnvFilter::builder()
        .with_default_directive(service_config.log_level.into())
        .from_env_lossy();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stderr_writer)
        .with_filter(stderr_env_filter);

    // a subscriber may already be installed (tests, repeated starts)
    let installed = if let Some(log_dir) = &service_config.log_dir {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!(
                "Warning: Failed to create log directory {:?}: {}",
                log_dir, e
            );
        }

        let file_appender = tracing_appender::rolling::daily(log_dir, "strongbox.log");
        let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        guards.push(file_guard);

        let file_env_filter = EnvFilter::builder()
            .with_default_directive(service_config.log_level.into())
            .from_env_lossy();

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(file_env_filter);

        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(file_layer)
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::registry()
            .with(stderr_layer)
            .try_init()
            .is_ok()
    };

    if installed {
        utils::register_panic_logger();
        utils::report_build_info();
    }

    guards
}

/// Initialize logging and build the service state.
pub async fn start_service(service_config: &ServiceConfig) -> Result<Service, StateSetupError> {
    let guards = init_logging(service_config);
    let state = ServiceState::from_config(service_config).await?;

    Ok(Service {
        state,
        _guards: guards,
    })
}
