//! File-based tracing setup for applications embedding the cache.

use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Install a global subscriber writing to a daily rolling file.
///
/// Keep the returned guard alive for as long as logs should be flushed.
pub fn init(config: &LoggingConfig) -> Result<WorkerGuard> {
  let directory = log_directory(config)?;
  std::fs::create_dir_all(&directory).map_err(|e| {
    eyre!(
      "Failed to create log directory {}: {}",
      directory.display(),
      e
    )
  })?;

  let appender = tracing_appender::rolling::daily(&directory, "cachewise.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::registry()
    .with(build_filter(std::env::var("RUST_LOG").ok(), &config.level)?)
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .try_init()
    .map_err(|e| eyre!("Failed to install tracing subscriber: {}", e))?;

  tracing::debug!(directory = %directory.display(), "logging initialized");
  Ok(guard)
}

/// Directory log files are written to.
pub fn log_directory(config: &LoggingConfig) -> Result<PathBuf> {
  if let Some(dir) = &config.directory {
    return Ok(dir.clone());
  }

  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("cachewise").join("logs"))
}

/// A non-empty RUST_LOG wins over the configured level.
fn build_filter(env: Option<String>, level: &str) -> Result<EnvFilter> {
  let directive = env.filter(|d| !d.trim().is_empty());
  let directive = directive.as_deref().unwrap_or(level);
  EnvFilter::try_new(directive).map_err(|e| eyre!("Invalid log filter '{}': {}", directive, e))
}
