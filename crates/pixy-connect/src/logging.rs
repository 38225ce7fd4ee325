use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

pub const LOG_FILE_NAME: &str = "pixy-connect.log";

/// Installs the global subscriber described by `config`.
///
/// `RUST_LOG` overrides `config.level`. Returns `false` when a subscriber
/// was already installed or the log directory could not be created; both
/// leave logging as it was.
pub fn init_tracing(config: &LogConfig) -> bool {
    static TRACE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

    let file_layer = match &config.path {
        Some(dir) => {
            if let Err(error) = std::fs::create_dir_all(dir) {
                eprintln!(
                    "warning: failed to create log directory {}: {error}",
                    dir.display()
                );
                return false;
            }
            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let _ = TRACE_GUARD.set(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(non_blocking),
            )
        }
        None => None,
    };
    let stdout_layer = config
        .stdout
        .then(|| tracing_subscriber::fmt::layer().with_ansi(false));

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .is_ok()
}
