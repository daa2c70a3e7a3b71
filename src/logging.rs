//! Tracing setup.
//!
//! Logs go to a daily-rolling file so they never interleave with shell
//! output. When the log directory cannot be created we fall back to stderr.

use color_eyre::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

const LOG_FILE_PREFIX: &str = "taskboard.log";

/// Install the global subscriber. The returned guard flushes buffered lines
/// on drop and must be held until exit.
pub fn init(config: &LogConfig) -> Result<WorkerGuard> {
  let filter = EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(&config.level))
    .unwrap_or_else(|_| EnvFilter::new("info"));

  let dir = config.resolved_dir()?;
  let (writer, guard) = match std::fs::create_dir_all(&dir) {
    Ok(()) => tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX)),
    Err(e) => {
      eprintln!("Failed to create log directory {}: {}", dir.display(), e);
      tracing_appender::non_blocking(std::io::stderr())
    }
  };

  tracing_subscriber::registry()
    .with(filter)
    .with(
      tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false),
    )
    .try_init()?;

  tracing::info!(
    version = env!("CARGO_PKG_VERSION"),
    log_dir = %dir.display(),
    "logging initialized"
  );

  Ok(guard)
}
