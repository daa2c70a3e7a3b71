use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Populate the store with the mock data set on startup
  #[serde(default = "default_seed")]
  pub seed: bool,
  #[serde(default)]
  pub session: SessionConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub log: LogConfig,
}

fn default_seed() -> bool {
  true
}

impl Default for Config {
  fn default() -> Self {
    Self {
      seed: default_seed(),
      session: SessionConfig::default(),
      cache: CacheConfig::default(),
      log: LogConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
  /// User reported by `getAuthUser`
  #[serde(default = "default_user_id")]
  pub user_id: u64,
}

fn default_user_id() -> u64 {
  1
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      user_id: default_user_id(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Buffered change events per subscriber before it lags
  #[serde(default = "default_event_capacity")]
  pub event_capacity: usize,
}

fn default_event_capacity() -> usize {
  256
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      event_capacity: default_event_capacity(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  /// Level filter, overridden by RUST_LOG when set
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Directory for log files (default: $XDG_DATA_HOME/taskboard/logs)
  pub dir: Option<PathBuf>,
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      dir: None,
    }
  }
}

impl LogConfig {
  /// Resolve the log directory, falling back to the user data directory.
  pub fn resolved_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("taskboard").join("logs"))
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./taskboard.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/taskboard/config.yaml
  ///
  /// With no file found the defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("taskboard.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("taskboard").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty file deserializes to null
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }
}
