//! Multiplexer configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::DEFAULT_TEARDOWN_GRACE_MS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiplexerConfig {
    /// Delay between the last callback leaving a topic and the physical
    /// unsubscribe. Zero tears down immediately.
    pub teardown_grace: Duration,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            teardown_grace: Duration::from_millis(DEFAULT_TEARDOWN_GRACE_MS),
        }
    }
}

impl MultiplexerConfig {
    /// Upper bound on the grace window. Longer windows keep dead
    /// subscriptions around for no benefit.
    pub const MAX_GRACE: Duration = Duration::from_secs(60);

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.teardown_grace > Self::MAX_GRACE {
            return Err(ConfigError::InvalidGrace(format!(
                "teardown_grace {:?} exceeds {:?}",
                self.teardown_grace,
                Self::MAX_GRACE
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid teardown grace: {0}")]
    InvalidGrace(String),
}
