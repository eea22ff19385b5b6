//! Configuration management for tally-reports
//!
//! This module provides configuration file support with TOML format,
//! environment variable overrides, and sensible defaults.
//!
//! ```toml
//! [sources]
//! time_entries_table = "time-entries"
//! projects_table = "projects"
//! policy = "strict"
//! data_dir = "./data"
//!
//! [cache]
//! ttl_seconds = 900
//! ```

use crate::cache::{CacheConfig, MAX_TTL_SECONDS};
use crate::error::{Error, Result, ValidationError};
use crate::query::ExecutorConfig;
use crate::source::{SourcePolicy, TableConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Row source configuration
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Report cache configuration
    #[serde(default)]
    pub cache: CacheSettings,

    /// Query execution defaults
    #[serde(default)]
    pub query: QuerySettings,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Row source configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourcesConfig {
    /// Table holding time entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_entries_table: Option<String>,

    /// Table holding projects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects_table: Option<String>,

    /// Table holding clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clients_table: Option<String>,

    /// Table holding users
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users_table: Option<String>,

    /// What to do when a data source has no table
    #[serde(default)]
    pub policy: SourcePolicy,

    /// Directory of `<table>.json` files for the file backend
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Report cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheSettings {
    /// Enable the report cache
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Report TTL in seconds
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Maximum entries in the in-process store
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

/// Query execution defaults
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QuerySettings {
    /// Page size when a request paginates without a limit
    #[serde(default = "default_page_limit")]
    pub default_page_limit: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_ttl_seconds() -> u64 {
    3600
}
fn default_max_entries() -> usize {
    10_000
}
fn default_page_limit() -> usize {
    50
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            time_entries_table: None,
            projects_table: None,
            clients_table: None,
            users_table: None,
            policy: SourcePolicy::default(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: default_ttl_seconds(),
            max_entries: default_max_entries(),
        }
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_page_limit: default_page_limit(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl SourcesConfig {
    /// Table mapping for the row source
    pub fn table_config(&self) -> TableConfig {
        TableConfig {
            time_entries: self.time_entries_table.clone(),
            projects: self.projects_table.clone(),
            clients: self.clients_table.clone(),
            users: self.users_table.clone(),
        }
    }
}

impl CacheSettings {
    /// Report cache configuration
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            enabled: self.enabled,
            ttl_seconds: self.ttl_seconds,
            max_entries: self.max_entries,
        }
    }
}

impl QuerySettings {
    /// Executor configuration
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig::new().with_default_page_limit(self.default_page_limit)
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Unparseable values are rejected rather than ignored.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        // Sources
        if let Ok(table) = std::env::var("TIME_ENTRIES_TABLE") {
            self.sources.time_entries_table = Some(table);
        }
        if let Ok(table) = std::env::var("PROJECTS_TABLE") {
            self.sources.projects_table = Some(table);
        }
        if let Ok(table) = std::env::var("CLIENTS_TABLE") {
            self.sources.clients_table = Some(table);
        }
        if let Ok(table) = std::env::var("USERS_TABLE") {
            self.sources.users_table = Some(table);
        }
        if let Ok(policy) = std::env::var("TALLY_SOURCE_POLICY") {
            self.sources.policy = policy.parse().map_err(|message| ValidationError::InvalidFormat {
                field: "TALLY_SOURCE_POLICY".to_string(),
                message,
            })?;
        }
        if let Ok(data_dir) = std::env::var("TALLY_DATA_DIR") {
            self.sources.data_dir = PathBuf::from(data_dir);
        }

        // Cache
        if let Ok(ttl) = std::env::var("TALLY_CACHE_TTL_SECONDS") {
            self.cache.ttl_seconds = ttl.trim().parse().map_err(|e| ValidationError::InvalidFormat {
                field: "TALLY_CACHE_TTL_SECONDS".to_string(),
                message: format!("{}", e),
            })?;
        }

        // Logging
        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let ttl = self.cache.ttl_seconds;
        if self.cache.enabled && (ttl == 0 || ttl > MAX_TTL_SECONDS) {
            return Err(ValidationError::OutOfRange {
                field: "cache.ttl_seconds".to_string(),
                value: ttl.to_string(),
                min: "1".to_string(),
                max: MAX_TTL_SECONDS.to_string(),
            }
            .into());
        }

        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(Error::Configuration("cache.max_entries must be > 0".to_string()));
        }

        if self.query.default_page_limit == 0 {
            return Err(Error::Configuration(
                "query.default_page_limit must be > 0".to_string(),
            ));
        }

        if self.sources.data_dir.as_os_str().is_empty() {
            return Err(ValidationError::MissingField("sources.data_dir".to_string()).into());
        }

        Ok(())
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataSource;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl_seconds, 3600);
        assert_eq!(config.query.default_page_limit, 50);
        assert_eq!(config.sources.policy, SourcePolicy::Lenient);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [sources]
            time_entries_table = "prod-time-entries"
            policy = "strict"

            [cache]
            ttl_seconds = 900
            "#,
        )
        .unwrap();

        assert_eq!(config.sources.policy, SourcePolicy::Strict);
        assert_eq!(config.cache.ttl_seconds, 900);
        assert_eq!(config.cache.max_entries, 10_000);
        let tables = config.sources.table_config();
        assert_eq!(tables.table_for(DataSource::TimeEntries), Some("prod-time-entries"));
        assert_eq!(tables.table_for(DataSource::Users), None);
    }

    #[test]
    fn test_zero_ttl_rejected_when_enabled() {
        let mut config = Config::default();
        config.cache.ttl_seconds = 0;
        assert!(config.validate().is_err());

        config.cache.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ttl_above_one_year_rejected() {
        let mut config = Config::default();
        config.cache.ttl_seconds = MAX_TTL_SECONDS;
        assert!(config.validate().is_ok());

        config.cache.ttl_seconds = u64::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cache.ttl_seconds"));

        // Disabled caches never use the TTL
        config.cache.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_page_limit_rejected() {
        let mut config = Config::default();
        config.query.default_page_limit = 0;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tally.toml");

        let mut config = Config::default();
        config.sources.users_table = Some("users-v2".to_string());
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.sources.users_table.as_deref(), Some("users-v2"));
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        assert!(matches!(
            Config::from_file("/nonexistent/tally.toml"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("TALLY_CACHE_TTL_SECONDS", "120");
        let config = Config::from_env().unwrap();
        std::env::remove_var("TALLY_CACHE_TTL_SECONDS");
        assert_eq!(config.cache.ttl_seconds, 120);
    }
}
