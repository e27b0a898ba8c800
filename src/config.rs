use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::report::types::{FiscalYear, UserId};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  pub fiscal_year: FiscalYear,
  /// Treat every remote call as unreachable and serve local data only
  #[serde(default)]
  pub offline_mode: bool,
  #[serde(default)]
  pub sync: SyncConfig,
  #[serde(default)]
  pub pagination: PaginationConfig,
  #[serde(default)]
  pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  pub base_url: String,
  pub user_id: u64,
  pub company_code: String,
  /// Connect and read timeout for each report call
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Slots synced longer ago than this are stale
  pub stale_after_minutes: i64,
  /// After a retryable failure, recommend waiting this long
  pub retry_after_minutes: i64,
  pub io_concurrency: usize,
  pub compute_concurrency: usize,
  pub chunk_size: usize,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      stale_after_minutes: 60,
      retry_after_minutes: 5,
      io_concurrency: 4,
      compute_concurrency: 2,
      chunk_size: 50,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
  pub page_size: usize,
  pub max_visible: usize,
}

impl Default for PaginationConfig {
  fn default() -> Self {
    Self {
      page_size: 50,
      max_visible: 100,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// Overrides the platform data directory
  pub data_dir: Option<PathBuf>,
  pub snapshot_retention_days: u64,
}

impl Default for StorageConfig {
  fn default() -> Self {
    Self {
      data_dir: None,
      snapshot_retention_days: 90,
    }
  }
}

impl StorageConfig {
  /// Root directory for the cache database, snapshots and logs.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("repsync"))
  }

  pub fn retention(&self) -> Duration {
    days(self.snapshot_retention_days)
  }
}

/// A span of whole days, saturating at `u64::MAX` seconds.
pub fn days(days: u64) -> Duration {
  Duration::from_secs(days.saturating_mul(24 * 60 * 60))
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./repsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/repsync/config.yaml
  /// 4. ~/.config/repsync/config.yaml
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
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/repsync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("repsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("repsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    if let Some(home) = dirs::home_dir() {
      let dot_config = home.join(".config").join("repsync").join("config.yaml");
      if dot_config.exists() {
        return Some(dot_config);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    UserId::new(self.api.user_id)?;
    if self.api.company_code.trim().is_empty() {
      return Err(eyre!("api.company_code must not be empty"));
    }
    if self.sync.chunk_size == 0 || self.pagination.page_size == 0 {
      return Err(eyre!("sync.chunk_size and pagination.page_size must be positive"));
    }
    if self.sync.io_concurrency == 0 || self.sync.compute_concurrency == 0 {
      return Err(eyre!("worker pool sizes must be positive"));
    }
    Ok(())
  }

  pub fn user_id(&self) -> Result<UserId> {
    Ok(UserId::new(self.api.user_id)?)
  }

  /// Get the report API token from environment variables.
  ///
  /// Checks REPSYNC_API_TOKEN first, then REPORTS_API_TOKEN as fallback.
  pub fn get_api_token() -> Option<String> {
    std::env::var("REPSYNC_API_TOKEN")
      .or_else(|_| std::env::var("REPORTS_API_TOKEN"))
      .ok()
      .filter(|t| !t.is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const MINIMAL: &str = r#"
api:
  base_url: https://reports.example.com/api/
  user_id: 42
  company_code: ACME
fiscal_year: 2024-25
"#;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::from_yaml(MINIMAL).unwrap();
    assert_eq!(config.api.timeout_secs, 30);
    assert_eq!(config.fiscal_year.as_str(), "2024-25");
    assert!(!config.offline_mode);
    assert_eq!(config.sync.io_concurrency, 4);
    assert_eq!(config.sync.compute_concurrency, 2);
    assert_eq!(config.pagination.page_size, 50);
    assert_eq!(config.pagination.max_visible, 100);
    assert_eq!(config.storage.snapshot_retention_days, 90);
  }

  #[test]
  fn test_overrides_are_read() {
    let yaml = format!(
      "{}offline_mode: true\nsync:\n  chunk_size: 25\npagination:\n  max_visible: 60\n",
      MINIMAL
    );
    let config = Config::from_yaml(&yaml).unwrap();
    assert!(config.offline_mode);
    assert_eq!(config.sync.chunk_size, 25);
    assert_eq!(config.sync.stale_after_minutes, 60);
    assert_eq!(config.pagination.max_visible, 60);
  }

  #[test]
  fn test_bad_fiscal_year_is_rejected() {
    let yaml = MINIMAL.replace("2024-25", "2024");
    assert!(Config::from_yaml(&yaml).is_err());
  }

  #[test]
  fn test_zero_user_id_is_rejected() {
    let yaml = MINIMAL.replace("user_id: 42", "user_id: 0");
    assert!(Config::from_yaml(&yaml).is_err());
  }

  #[test]
  fn test_missing_explicit_path_is_error() {
    let err = Config::load(Some(Path::new("/definitely/not/here.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }

  #[test]
  fn test_explicit_data_dir_wins() {
    let storage = StorageConfig {
      data_dir: Some(PathBuf::from("/tmp/repsync-test")),
      ..Default::default()
    };
    assert_eq!(storage.data_dir().unwrap(), PathBuf::from("/tmp/repsync-test"));
  }

  #[test]
  fn test_huge_retention_saturates() {
    let storage = StorageConfig {
      snapshot_retention_days: u64::MAX,
      ..Default::default()
    };
    assert_eq!(storage.retention(), Duration::from_secs(u64::MAX));
    assert_eq!(days(2), Duration::from_secs(172_800));
  }
}
