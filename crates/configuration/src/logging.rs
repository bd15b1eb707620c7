use crate::error::ConfigError;
use crate::settings::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs the global subscriber: human-readable lines on stdout plus the same
/// events appended to the configured log file.
///
/// `RUST_LOG` takes precedence over `logging.level`. The returned guard must be
/// held for the life of the process or buffered file output is lost.
pub fn init_tracing(cfg: &LoggingConfig) -> Result<WorkerGuard, ConfigError> {
    std::fs::create_dir_all(&cfg.directory).map_err(|e| {
        ConfigError::Logging(format!("cannot create log directory {}: {}", cfg.directory.display(), e))
    })?;

    let file_appender = tracing_appender::rolling::never(&cfg.directory, &cfg.file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.level))
        .map_err(|e| ConfigError::Logging(format!("invalid log level '{}': {}", cfg.level, e)))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))?;

    Ok(guard)
}
