//! Telemetry configuration from environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Configuration for log output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,

    /// Log filter directive (`info`, `link_rpc=debug,warn`, ...)
    pub log_level: String,

    /// Whether to write to stdout at all
    pub console_output: bool,

    /// JSON lines instead of human-readable output
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "actuator-link".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("service name must not be empty")]
    EmptyServiceName,

    #[error("invalid log filter {directive:?}: {reason}")]
    InvalidLogLevel { directive: String, reason: String },
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `LINK_SERVICE_NAME`: Service name (default: actuator-link)
    /// - `LINK_LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `LINK_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `LINK_JSON_LOGS`: Enable JSON logs (default: false)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            service_name: lookup("LINK_SERVICE_NAME").unwrap_or(defaults.service_name),

            log_level: lookup("LINK_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or(defaults.log_level),

            console_output: lookup("LINK_CONSOLE_OUTPUT")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(defaults.console_output),

            json_logs: lookup("LINK_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(defaults.json_logs),
        }
    }

    /// Check the service name and that `log_level` parses as a filter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::EmptyServiceName);
        }
        EnvFilter::try_new(&self.log_level).map_err(|e| ConfigError::InvalidLogLevel {
            directive: self.log_level.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}
