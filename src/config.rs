//! Bus configuration
//!
//! Loaded from JSON (camelCase keys, every field optional).

use crate::error::{EventError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for an `EventBus`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusConfig {
    /// Bus label, attached to log records and `BusInfo`
    #[serde(default = "default_name")]
    pub name: String,

    /// Per-subscriber wait used by `publish_with_default_timeout` (milliseconds)
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
}

fn default_name() -> String {
    "default".to_string()
}

fn default_timeout_ms() -> u64 {
    1000
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            default_timeout_ms: default_timeout_ms(),
        }
    }
}

impl BusConfig {
    /// Parse and validate a JSON config
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            EventError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }

    /// Reject values the bus cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(EventError::Config("name must not be empty".to_string()));
        }
        if self.default_timeout_ms == 0 {
            return Err(EventError::Config(
                "defaultTimeoutMs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Default per-subscriber timeout
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}
