//! Correlator configuration.

use link_types::LinkError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelatorConfig {
    /// Timeout applied when a call does not choose its own.
    pub default_timeout: Duration,
    /// Longest timeout a call may request.
    pub max_timeout: Duration,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(5),
            max_timeout: Duration::from_secs(60),
        }
    }
}

impl CorrelatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "default_timeout cannot be 0".into(),
            ));
        }
        if self.default_timeout > self.max_timeout {
            return Err(ConfigError::InvalidTimeout(format!(
                "default_timeout {:?} exceeds max_timeout {:?}",
                self.default_timeout, self.max_timeout
            )));
        }
        Ok(())
    }

    /// Pick the timeout for one call.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` for a zero timeout or one above `max_timeout`.
    pub fn resolve_timeout(&self, requested: Option<Duration>) -> Result<Duration, LinkError> {
        let timeout = requested.unwrap_or(self.default_timeout);
        if timeout.is_zero() {
            return Err(LinkError::InvalidRequest("timeout must be positive".into()));
        }
        if timeout > self.max_timeout {
            return Err(LinkError::InvalidRequest(format!(
                "timeout {:?} exceeds maximum {:?}",
                timeout, self.max_timeout
            )));
        }
        Ok(timeout)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
}
