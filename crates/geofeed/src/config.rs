//! Configuration management for geofeed.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::mutator::{MutatorOptions, WriteMode, DEFAULT_MAX_RETRIES};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "geofeed";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "reports.db";

/// Upper bound for `engagement.max_retries`.
pub const MAX_RETRIES_CEILING: u32 = 16;

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `GEOFEED_`, `__` between levels)
/// 2. TOML config file at `~/.config/geofeed/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Record store configuration.
    pub store: StoreConfig,
    /// Engagement write behaviour.
    pub engagement: EngagementConfig,
    /// Who is acting.
    pub identity: IdentityConfig,
}

/// Store-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/geofeed/reports.db`
    pub database_path: Option<PathBuf>,
}

/// Engagement-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementConfig {
    /// How derived reports are written back.
    pub write_mode: WriteMode,
    /// Re-derivations allowed after a lost conditional write.
    pub max_retries: u32,
    /// Re-read the feed after every successful write.
    pub refetch_after_mutation: bool,
    /// Events buffered per subscriber.
    pub event_capacity: usize,
}

/// Identity configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Opaque identifier of the acting user.
    pub user: Option<String>,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            write_mode: WriteMode::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            refetch_after_mutation: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `GEOFEED_`)
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
        Self::from_figment(Self::figment(&config_file))
    }

    /// The layered provider stack for `config_file`.
    fn figment(config_file: &std::path::Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed("GEOFEED_").split("__"))
    }

    fn from_figment(figment: Figment) -> Result<Self> {
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
        if self.engagement.max_retries > MAX_RETRIES_CEILING {
            return Err(Error::ConfigValidation {
                message: format!(
                    "max_retries ({}) cannot be greater than {MAX_RETRIES_CEILING}",
                    self.engagement.max_retries
                ),
            });
        }

        if self.engagement.event_capacity == 0 {
            return Err(Error::ConfigValidation {
                message: "event_capacity must be greater than 0".to_string(),
            });
        }

        if self.identity.user.as_deref() == Some("") {
            return Err(Error::ConfigValidation {
                message: "identity.user must not be empty when set".to_string(),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.store
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Mutator options described by the `[engagement]` section.
    #[must_use]
    pub fn mutator_options(&self) -> MutatorOptions {
        MutatorOptions {
            write_mode: self.engagement.write_mode,
            max_retries: self.engagement.max_retries,
            refetch_after_mutation: self.engagement.refetch_after_mutation,
        }
    }
}
