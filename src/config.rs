use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sync::DEFAULT_MAX_RETRIES;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub store: StoreConfig,
  #[serde(default)]
  pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base url of the remote research API.
  #[serde(default = "default_base_url")]
  pub base_url: String,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: default_base_url(),
    }
  }
}

fn default_base_url() -> String {
  "http://localhost:8000".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
  /// Database path override (default: the platform data directory)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// Failed replay attempts an item survives before being dropped
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  /// How often the health probe refreshes the connectivity reading
  #[serde(default = "default_probe_interval_secs")]
  pub probe_interval_secs: u64,
  /// TTL for cached knowledge-base stats
  #[serde(default = "default_stats_ttl_secs")]
  pub stats_ttl_secs: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      max_retries: default_max_retries(),
      probe_interval_secs: default_probe_interval_secs(),
      stats_ttl_secs: default_stats_ttl_secs(),
    }
  }
}

fn default_max_retries() -> u32 {
  DEFAULT_MAX_RETRIES
}

fn default_probe_interval_secs() -> u64 {
  30
}

fn default_stats_ttl_secs() -> u64 {
  300
}

impl SyncConfig {
  pub fn probe_interval(&self) -> Duration {
    Duration::from_secs(self.probe_interval_secs)
  }

  pub fn stats_ttl(&self) -> Duration {
    Duration::from_secs(self.stats_ttl_secs)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./carrel.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/carrel/config.yaml
  ///
  /// Every field has a default, so a missing config file is fine.
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
    let local = PathBuf::from("carrel.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("carrel").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }
}
