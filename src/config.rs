use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cache::PolicyKind;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub remote: RemoteConfig,
  /// Policy used by `CachedClient::get` when none is given
  #[serde(default)]
  pub default_policy: PolicyKind,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
  /// Keys are resolved relative to this URL
  pub base_url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
  /// SQLite database on disk
  #[default]
  Sqlite,
  /// Process-local map, lost on exit
  Memory,
  /// Caching disabled - every lookup misses
  None,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  #[serde(default)]
  pub backend: StorageBackend,
  /// Database file (defaults to $XDG_DATA_HOME/cachewise/cache.db)
  pub path: Option<PathBuf>,
  /// Serialize read-decide-write per key instead of last-write-wins
  #[serde(default)]
  pub serialize_per_key: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
  /// EnvFilter directive; RUST_LOG takes precedence
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Directory for rolling log files (defaults to the data directory)
  pub directory: Option<PathBuf>,
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      directory: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// An explicit path must exist. Otherwise the first of
  /// [`Config::search_paths`] that exists is used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    if let Some(p) = explicit_path {
      if !p.exists() {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
      return Self::load_from_path(p);
    }

    let candidates = Self::search_paths();
    match first_existing(&candidates) {
      Some(p) => Self::load_from_path(p),
      None => Err(eyre!(
        "No configuration file found (searched {}). It must set remote.base_url",
        candidates
          .iter()
          .map(|p| p.display().to_string())
          .collect::<Vec<_>>()
          .join(", ")
      )),
    }
  }

  /// `./cachewise.yaml`, then `$XDG_CONFIG_HOME/cachewise/config.yaml`.
  pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("cachewise.yaml")];
    if let Some(config_dir) = dirs::config_dir() {
      paths.push(config_dir.join("cachewise").join("config.yaml"));
    }
    paths
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Get the bearer token for the remote from the environment.
  ///
  /// Checks CACHEWISE_API_TOKEN. Absence means unauthenticated requests.
  pub fn get_api_token() -> Option<String> {
    std::env::var("CACHEWISE_API_TOKEN")
      .ok()
      .filter(|t| !t.is_empty())
  }
}

fn first_existing(candidates: &[PathBuf]) -> Option<&Path> {
  candidates.iter().map(PathBuf::as_path).find(|p| p.is_file())
}
