use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{PersistSettings, WriterSettings};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub backend: BackendConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  /// Signed-in user; cached data is stored per user when set
  pub user: Option<String>,
  /// Custom title for header (defaults to backend host if not set)
  pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
  /// Base URL of the backend, e.g. https://xyz.supabase.co
  pub url: String,
  /// Database schema exposed by the REST endpoint
  #[serde(default = "default_schema")]
  pub schema: String,
}

fn default_schema() -> String {
  "public".to_string()
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
  pub deduping_interval_secs: u64,
  pub refresh_interval_secs: u64,
  pub error_retry_count: u32,
  pub error_retry_interval_secs: u64,
  /// Mirror the cache to disk so it survives restarts
  pub persist: bool,
  pub debounce_ms: u64,
  pub max_write_delay_ms: u64,
  /// Persisted entries older than this are ignored on startup
  pub snapshot_max_age_secs: u64,
  /// Override the cache database location
  pub database: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      deduping_interval_secs: 5 * 60,
      refresh_interval_secs: 10 * 60,
      error_retry_count: 3,
      error_retry_interval_secs: 5,
      persist: true,
      debounce_ms: 500,
      max_write_delay_ms: 5_000,
      snapshot_max_age_secs: 24 * 60 * 60,
      database: None,
    }
  }
}

impl CacheConfig {
  pub fn persist_settings(&self) -> PersistSettings {
    PersistSettings {
      writer: WriterSettings {
        debounce: Duration::from_millis(self.debounce_ms),
        max_delay: Duration::from_millis(self.max_write_delay_ms),
      },
      max_age: Duration::from_secs(self.snapshot_max_age_secs),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./formation-portal.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/formation-portal/config.yaml
  /// 4. ~/.config/formation-portal/config.yaml
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
        "No configuration file found. Create one at ~/.config/formation-portal/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("formation-portal.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("formation-portal").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;

    if config.cache.debounce_ms > config.cache.max_write_delay_ms {
      return Err(eyre!(
        "cache.debounce_ms ({}) must not exceed cache.max_write_delay_ms ({})",
        config.cache.debounce_ms,
        config.cache.max_write_delay_ms
      ));
    }

    Ok(config)
  }

  /// Get the backend API key from environment variables.
  ///
  /// Checks FORMATION_PORTAL_API_KEY first, then SUPABASE_ANON_KEY as fallback.
  pub fn get_api_key() -> Result<String> {
    std::env::var("FORMATION_PORTAL_API_KEY")
      .or_else(|_| std::env::var("SUPABASE_ANON_KEY"))
      .map_err(|_| {
        eyre!(
          "Backend API key not found. Set FORMATION_PORTAL_API_KEY or SUPABASE_ANON_KEY environment variable."
        )
      })
  }

  /// Get the user access token from environment variables, if any.
  ///
  /// Checks FORMATION_PORTAL_ACCESS_TOKEN. Without it requests use the API key.
  pub fn get_access_token() -> Option<String> {
    std::env::var("FORMATION_PORTAL_ACCESS_TOKEN").ok()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_cache_defaults() {
    let config = Config::parse("backend:\n  url: https://portal.example.org\n").unwrap();

    assert_eq!(config.backend.url, "https://portal.example.org");
    assert_eq!(config.backend.schema, "public");
    assert_eq!(config.cache, CacheConfig::default());
    assert!(config.user.is_none());
  }

  #[test]
  fn test_cache_section_overrides() {
    let yaml = r#"
backend:
  url: https://portal.example.org
user: alice@example.org
cache:
  refresh_interval_secs: 60
  persist: false
  debounce_ms: 250
"#;
    let config = Config::parse(yaml).unwrap();

    assert_eq!(config.user.as_deref(), Some("alice@example.org"));
    assert_eq!(config.cache.refresh_interval_secs, 60);
    assert_eq!(config.cache.deduping_interval_secs, 300);
    assert!(!config.cache.persist);

    let settings = config.cache.persist_settings();
    assert_eq!(settings.writer.debounce, Duration::from_millis(250));
    assert_eq!(settings.max_age, Duration::from_secs(86_400));
  }

  #[test]
  fn test_debounce_longer_than_max_delay_is_rejected() {
    let yaml = r#"
backend:
  url: https://portal.example.org
cache:
  debounce_ms: 10000
  max_write_delay_ms: 1000
"#;
    assert!(Config::parse(yaml).is_err());
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    let result = Config::load(Some(Path::new("/nonexistent/formation-portal.yaml")));
    assert!(result.is_err());
  }
}
