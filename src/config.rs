//! Configuration management for the cube engine
//!
//! TOML file support with serde defaults and environment variable
//! overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::cube::service::DEFAULT_CACHE_CAPACITY;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct CubeConfig {
    #[serde(default)]
    pub snapshot: SnapshotConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the pre-aggregated cube is read from
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SnapshotConfig {
    /// CSV file produced by the ETL stage
    #[serde(default = "default_snapshot_path")]
    pub path: PathBuf,
}

/// Query result cache
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CacheConfig {
    /// Cached results (0 disables the cache)
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

/// Snapshot completeness checks
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ValidationConfig {
    /// Minimum acceptable cube rows
    #[serde(default = "default_min_rows")]
    pub min_rows: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level or filter directive (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("data/cube.csv")
}
fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}
fn default_min_rows() -> usize {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: default_snapshot_path(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_rows: default_min_rows(),
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

impl CubeConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load configuration with environment variable overrides, falling back
    /// to defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// `RUST_LOG` is not read here; [`crate::telemetry::init`] already gives
    /// it precedence over `logging.level`.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(path) = lookup("OLAP_CUBE_SNAPSHOT") {
            self.snapshot.path = PathBuf::from(path);
        }
        if let Some(capacity) = lookup("OLAP_CUBE_CACHE_CAPACITY") {
            self.cache.capacity = parse_count("OLAP_CUBE_CACHE_CAPACITY", &capacity)?;
        }
        if let Some(min_rows) = lookup("OLAP_CUBE_MIN_ROWS") {
            self.validation.min_rows = parse_count("OLAP_CUBE_MIN_ROWS", &min_rows)?;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.snapshot.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("snapshot path cannot be empty".into()));
        }
        if self.validation.min_rows == 0 {
            return Err(ConfigError::Invalid("min_rows must be > 0".into()));
        }
        Ok(())
    }
}

fn parse_count(var: &str, raw: &str) -> Result<usize, ConfigError> {
    raw.trim().parse().map_err(|_| {
        ConfigError::Invalid(format!(
            "{var} must be a non-negative integer, got {raw:?}"
        ))
    })
}
