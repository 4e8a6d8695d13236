//! Configuration management
//!
//! TOML configuration with environment variable overrides and defaults for
//! every field, so an empty file is a valid configuration.
//!
//! ```toml
//! [logging]
//! level = "debug"
//!
//! [cost]
//! default_granularity = "daily"
//! metrics = ["UnblendedCost", "UsageQuantity"]
//! max_concurrent_sources = 8
//!
//! [[providers]]
//! name = "prod"
//! provider_type = "aws"
//! account_id = "123456789012"
//!
//! [vocabulary.aws.tags]
//! team = "Team"
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::normalize::{VocabularyOverrides, DEFAULT_DATE_FORMAT};
use crate::types::{CostQuery, Granularity};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Cost queries
    #[serde(default)]
    pub cost: CostConfig,

    /// Resource scans
    #[serde(default)]
    pub scan: ScanConfig,

    /// Accounts to query and scan
    #[serde(default)]
    pub providers: Vec<Provider>,

    /// Extra vocabulary mappings keyed by provider type
    #[serde(default)]
    pub vocabulary: BTreeMap<String, VocabularyOverrides>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "cloudcost=debug"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Include the event target in log lines
    #[serde(default = "default_true")]
    pub with_target: bool,
}

/// Cost query configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CostConfig {
    /// Granularity used when a caller does not pick one
    #[serde(default)]
    pub default_granularity: Granularity,

    /// Provider metric names to request
    #[serde(default = "default_metrics")]
    pub metrics: Vec<String>,

    /// Provider date format for daily and monthly windows
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// Maximum sources queried at once (0 = unbounded)
    #[serde(default)]
    pub max_concurrent_sources: usize,
}

/// Resource scan configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScanConfig {
    /// Maximum operations running at once per account (0 = unbounded)
    #[serde(default)]
    pub max_concurrent_operations: usize,
}

/// One provider account
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Provider {
    /// Unique name, used as the source name in logs and errors
    pub name: String,

    /// Registry key selecting the provider implementation
    pub provider_type: String,

    /// Account identifier within the provider
    #[serde(default)]
    pub account_id: String,

    /// Implementation-specific settings
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

impl Provider {
    /// Create a provider entry
    pub fn new(
        name: impl Into<String>,
        provider_type: impl Into<String>,
        account_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            provider_type: provider_type.into(),
            account_id: account_id.into(),
            settings: BTreeMap::new(),
        }
    }

    /// Add a setting
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Look up a setting
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_metrics() -> Vec<String> { vec!["UnblendedCost".to_string()] }
fn default_date_format() -> String { DEFAULT_DATE_FORMAT.to_string() }
fn default_true() -> bool { true }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            with_target: true,
        }
    }
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            default_granularity: Granularity::default(),
            metrics: default_metrics(),
            date_format: default_date_format(),
            max_concurrent_sources: 0,
        }
    }
}

impl CostConfig {
    /// Start a query over `[start, end)` at the configured default granularity
    pub fn query(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> CostQuery {
        CostQuery::new(start, end).with_granularity(self.default_granularity)
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| Error::Configuration(format!("Failed to parse config: {}", e)))
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
    /// `RUST_LOG` takes precedence over `CLOUDCOST_LOG_LEVEL`.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        // Logging
        if let Ok(level) = std::env::var("CLOUDCOST_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }

        // Cost
        if let Ok(granularity) = std::env::var("CLOUDCOST_DEFAULT_GRANULARITY") {
            self.cost.default_granularity = granularity.parse()?;
        }
        if let Ok(limit) = std::env::var("CLOUDCOST_MAX_CONCURRENT_SOURCES") {
            self.cost.max_concurrent_sources = parse_env("CLOUDCOST_MAX_CONCURRENT_SOURCES", &limit)?;
        }

        // Scan
        if let Ok(limit) = std::env::var("CLOUDCOST_MAX_CONCURRENT_OPERATIONS") {
            self.scan.max_concurrent_operations =
                parse_env("CLOUDCOST_MAX_CONCURRENT_OPERATIONS", &limit)?;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.logging.level.trim().is_empty() {
            return Err(Error::Configuration("Log level cannot be empty".to_string()));
        }

        if self.cost.metrics.is_empty() {
            return Err(Error::Configuration("At least one cost metric is required".to_string()));
        }
        if self.cost.metrics.iter().any(|m| m.trim().is_empty()) {
            return Err(Error::Configuration("Cost metric names cannot be empty".to_string()));
        }
        if self.cost.date_format.is_empty() {
            return Err(Error::Configuration("Date format cannot be empty".to_string()));
        }

        let mut names = std::collections::HashSet::new();
        for provider in &self.providers {
            if provider.name.is_empty() {
                return Err(Error::Configuration("Provider name cannot be empty".to_string()));
            }
            if provider.provider_type.is_empty() {
                return Err(Error::Configuration(format!(
                    "Provider {} has no provider_type",
                    provider.name
                )));
            }
            if !names.insert(provider.name.as_str()) {
                return Err(Error::Configuration(format!(
                    "Duplicate provider name: {}",
                    provider.name
                )));
            }
        }

        Ok(())
    }

    /// Vocabulary overrides configured for a provider type
    pub fn vocabulary_overrides(&self, provider_type: &str) -> Option<&VocabularyOverrides> {
        self.vocabulary.get(provider_type)
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents).map_err(|e| {
            Error::Configuration(format!("Failed to write config file {}: {}", path.display(), e))
        })
    }
}

fn parse_env(name: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|e| Error::Configuration(format!("Invalid {}={:?}: {}", name, value, e)))
}
