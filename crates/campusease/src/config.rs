//! Configuration management for campusease.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "campusease";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "campusease.db";

/// Allowed shape of the storage key namespace.
const NAMESPACE_PATTERN: &str = r"^[a-z][a-z0-9_]*$";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `CAMPUSEASE_`, sections split by `__`)
/// 2. TOML config file at `~/.config/campusease/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Cross-context sync configuration.
    pub sync: SyncConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/campusease/campusease.db`
    pub database_path: Option<PathBuf>,
    /// Prefix for the persisted collection keys.
    pub namespace: String,
}

/// Sync-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Deliver publishes to other processes sharing the database.
    pub cross_context: bool,
    /// Interval between change-log polls in milliseconds.
    pub poll_interval_ms: u64,
    /// Number of change-log entries kept when a context opens.
    /// Set to 0 for unlimited.
    pub change_log_retention: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None, // Will be resolved to default at runtime
            namespace: DATA_DIR_NAME.to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cross_context: true,
            poll_interval_ms: 250,
            change_log_retention: 1_000,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("CAMPUSEASE_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.sync.poll_interval_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "poll_interval_ms must be greater than 0".to_string(),
            });
        }

        let pattern = regex::Regex::new(NAMESPACE_PATTERN)
            .map_err(|e| Error::internal(format!("namespace pattern: {e}")))?;
        if !pattern.is_match(&self.storage.namespace) {
            return Err(Error::ConfigValidation {
                message: format!(
                    "invalid namespace '{}': must match {NAMESPACE_PATTERN}",
                    self.storage.namespace
                ),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the poll interval as a Duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.sync.poll_interval_ms)
    }

    /// Get the change-log retention, or `None` when unlimited.
    #[must_use]
    pub fn change_log_retention(&self) -> Option<usize> {
        match self.sync.change_log_retention {
            0 => None,
            n => Some(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.storage.database_path.is_none());
        assert_eq!(config.storage.namespace, "campusease");
        assert!(config.sync.cross_context);
        assert_eq!(config.sync.poll_interval_ms, 250);
        assert_eq!(config.sync.change_log_retention, 1_000);
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_poll_interval() {
        let mut config = Config::default();
        config.sync.poll_interval_ms = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("poll_interval_ms"));
    }

    #[test]
    fn test_validate_bad_namespace() {
        for bad in ["", "Campus", "9lives", "campus-ease", "a b"] {
            let mut config = Config::default();
            config.storage.namespace = bad.to_string();

            let err = config.validate().unwrap_err().to_string();
            assert!(err.contains("invalid namespace"), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_validate_good_namespace() {
        let mut config = Config::default();
        config.storage.namespace = "campus_2026".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        let path = config.database_path();

        assert!(path.to_string_lossy().contains("campusease.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_poll_interval() {
        let config = Config::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_change_log_retention() {
        let mut config = Config::default();
        assert_eq!(config.change_log_retention(), Some(1_000));

        config.sync.change_log_retention = 0;
        assert!(config.change_log_retention().is_none());
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("campusease"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[storage]
namespace = "demo"

[sync]
poll_interval_ms = 50
cross_context = false
"#,
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.storage.namespace, "demo");
        assert_eq!(config.sync.poll_interval_ms, 50);
        assert!(!config.sync.cross_context);
        assert_eq!(config.sync.change_log_retention, 1_000);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sync]\npoll_interval_ms = 0\n").unwrap();

        let result = Config::load_from(Some(path));
        assert!(matches!(result, Err(Error::ConfigValidation { .. })));
    }

    #[test]
    fn test_sync_config_deserialize() {
        let json = r#"{"poll_interval_ms": 1000}"#;
        let sync: SyncConfig = serde_json::from_str(json).unwrap();
        assert_eq!(sync.poll_interval_ms, 1000);
        assert!(sync.cross_context);
    }
}
