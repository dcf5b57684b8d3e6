//! Store configuration types.

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default capacity of each event channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Configuration for a store and its local provider.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct StoreConfig {
    /// Container identifier to initialize with.
    #[builder(setter(into, strip_option), default)]
    #[serde(default)]
    pub container_id: Option<String>,

    /// Directory holding the local provider's containers.
    #[builder(default = "default_base_dir()")]
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Buffered events per channel before the producer waits.
    #[builder(default = "DEFAULT_CHANNEL_CAPACITY")]
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Interval between simulated transfer steps, in milliseconds.
    #[builder(default = "250")]
    #[serde(default = "default_driver_interval_ms")]
    pub driver_interval_ms: u64,

    /// Percent advanced per simulated transfer step.
    #[builder(default = "25.0")]
    #[serde(default = "default_driver_step")]
    pub driver_step: f64,

    /// Whether the simulated identity is signed in.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub signed_in: bool,
}

fn default_base_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stratus")
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_driver_interval_ms() -> u64 {
    250
}

fn default_driver_step() -> f64 {
    25.0
}

fn default_true() -> bool {
    true
}

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl StoreConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(capacity) = self.channel_capacity {
            if capacity == 0 {
                return Err("Channel capacity must be positive".to_string());
            }
        }
        if let Some(step) = self.driver_step {
            if !(step > 0.0 && step <= 100.0) {
                return Err("Driver step must be in (0, 100]".to_string());
            }
        }
        if let Some(Some(ref id)) = self.container_id {
            if id.is_empty() {
                return Err("Container id cannot be empty".to_string());
            }
        }
        Ok(())
    }
}

impl StoreConfig {
    /// Create a new store config builder.
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }

    /// Default location of the configuration file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stratus")
            .join("config.toml")
    }

    /// Load a config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.check()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    fn check(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::Invalid {
            message: message.to_string(),
        };
        if self.channel_capacity == 0 {
            return Err(invalid("channel_capacity must be positive"));
        }
        if !(self.driver_step > 0.0 && self.driver_step <= 100.0) {
            return Err(invalid("driver_step must be in (0, 100]"));
        }
        if self.container_id.as_deref() == Some("") {
            return Err(invalid("container_id cannot be empty"));
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            container_id: None,
            base_dir: default_base_dir(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            driver_interval_ms: default_driver_interval_ms(),
            driver_step: default_driver_step(),
            signed_in: true,
        }
    }
}
