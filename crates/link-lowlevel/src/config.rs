//! Low-level channel configuration.

use link_types::topics;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Which low-level state stream to consume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateRate {
    /// Full-rate `rt/lowstate`.
    #[default]
    #[serde(rename = "hf")]
    High,
    /// Decimated `rt/lf/lowstate`.
    #[serde(rename = "lf")]
    Low,
}

impl StateRate {
    #[must_use]
    pub fn topic(self) -> &'static str {
        match self {
            StateRate::High => topics::LOW_STATE,
            StateRate::Low => topics::LOW_STATE_LF,
        }
    }
}

impl FromStr for StateRate {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hf" | "high" => Ok(StateRate::High),
            "lf" | "low" => Ok(StateRate::Low),
            other => Err(ConfigError::InvalidStateRate(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LowLevelConfig {
    /// Period of the command stream.
    pub command_interval: Duration,
    pub state_rate: StateRate,
    /// Consecutive tick failures before the stream reports degraded health.
    pub degraded_after: u64,
}

impl Default for LowLevelConfig {
    fn default() -> Self {
        Self {
            command_interval: Duration::from_millis(2),
            state_rate: StateRate::High,
            degraded_after: 3,
        }
    }
}

impl LowLevelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command_interval.is_zero() {
            return Err(ConfigError::InvalidInterval(
                "command_interval cannot be 0".into(),
            ));
        }
        if self.degraded_after == 0 {
            return Err(ConfigError::InvalidThreshold(
                "degraded_after cannot be 0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid interval: {0}")]
    InvalidInterval(String),
    #[error("invalid threshold: {0}")]
    InvalidThreshold(String),
    #[error("unknown state rate {0:?} (expected hf or lf)")]
    InvalidStateRate(String),
}
