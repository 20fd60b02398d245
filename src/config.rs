use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{FetchConfig, RetryPolicy};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub retry: RetryConfig,
  #[serde(default)]
  pub remote: RemoteConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// When false, every request goes to the remote and nothing is stored
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Database file (default: $XDG_DATA_HOME/adcache/cache.db)
  pub path: Option<PathBuf>,
  #[serde(default = "default_ttl_secs")]
  pub ttl_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
      ttl_secs: default_ttl_secs(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  #[serde(default = "default_base_backoff_ms")]
  pub base_backoff_ms: u64,
  #[serde(default = "default_max_backoff_ms")]
  pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_retries: default_max_retries(),
      base_backoff_ms: default_base_backoff_ms(),
      max_backoff_ms: default_max_backoff_ms(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
  /// Reporting API root, e.g. https://reports.example.com/v1/
  pub base_url: Option<String>,
  #[serde(default = "default_max_pages")]
  pub max_pages: usize,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for RemoteConfig {
  fn default() -> Self {
    Self {
      base_url: None,
      max_pages: default_max_pages(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  /// Filter directive, overridden by ADCACHE_LOG
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Write daily log files here instead of stderr
  pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      directory: None,
    }
  }
}

fn default_true() -> bool {
  true
}

fn default_ttl_secs() -> u64 {
  24 * 60 * 60
}

fn default_max_retries() -> u32 {
  3
}

fn default_base_backoff_ms() -> u64 {
  1_000
}

fn default_max_backoff_ms() -> u64 {
  10_000
}

fn default_max_pages() -> usize {
  20
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./adcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/adcache/config.yaml
  ///
  /// Falls back to defaults when no file is found.
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
    let local = PathBuf::from("adcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("adcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.retry.base_backoff_ms > self.retry.max_backoff_ms {
      return Err(eyre!(
        "retry.base_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
        self.retry.base_backoff_ms,
        self.retry.max_backoff_ms
      ));
    }
    if self.remote.max_pages == 0 {
      return Err(eyre!("remote.max_pages must be at least 1"));
    }
    Ok(())
  }

  /// Explicit settings for the fetch coordinator.
  pub fn fetch_config(&self) -> FetchConfig {
    FetchConfig {
      ttl: Duration::from_secs(self.cache.ttl_secs),
      retry: RetryPolicy {
        max_retries: self.retry.max_retries,
        base_backoff: Duration::from_millis(self.retry.base_backoff_ms),
        max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
      },
    }
  }

  /// Get the reporting API token from environment variables.
  ///
  /// Checks ADCACHE_API_TOKEN first, then ADS_API_TOKEN as fallback.
  pub fn get_api_token() -> Option<String> {
    std::env::var("ADCACHE_API_TOKEN")
      .or_else(|_| std::env::var("ADS_API_TOKEN"))
      .ok()
      .filter(|t| !t.is_empty())
  }
}
