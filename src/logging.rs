use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "formation_portal=info";

/// Directory holding the rolling log files.
pub fn log_dir() -> PathBuf {
  dirs::data_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join("formation-portal")
    .join("logs")
}

/// Install the global subscriber writing to a daily rolling file.
///
/// The terminal belongs to the UI, so nothing is logged to stdout. `RUST_LOG`
/// overrides the default filter. Keep the returned guard alive until exit or
/// buffered lines are lost.
pub fn init(dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(dir, "formation-portal.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let env_filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

  tracing_subscriber::registry()
    .with(env_filter)
    .with(fmt::layer().with_writer(writer).with_ansi(false).with_target(true))
    .try_init()
    .map_err(|e| eyre!("Failed to install tracing subscriber: {}", e))?;

  Ok(guard)
}
