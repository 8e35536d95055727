//! # Runtime Configuration
//!
//! Unified configuration for every component the runtime wires together.
//! Each section keeps its own defaults and `validate()`; the runtime only
//! aggregates them and applies environment overrides.

use link_bus::MultiplexerConfig;
use link_clients::{ServiceStatusPolicy, SportStateRate};
use link_lowlevel::{LowLevelConfig, StateRate};
use link_rpc::CorrelatorConfig;
use link_telemetry::TelemetryConfig;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeConfig {
    /// Request/reply timeouts.
    pub correlator: CorrelatorConfig,
    /// Deferred unsubscribe grace.
    pub multiplexer: MultiplexerConfig,
    /// Command cadence and state stream.
    pub low_level: LowLevelConfig,
    /// Log output.
    pub telemetry: TelemetryConfig,
    /// Interpretation of the remote service-status flag.
    pub service_status: ServiceStatusPolicy,
    /// Which sport-state report stream to follow.
    pub sport_state_rate: SportStateRate,
}

/// Configuration errors, one variant per section.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("correlator: {0}")]
    Correlator(#[from] link_rpc::ConfigError),

    #[error("multiplexer: {0}")]
    Multiplexer(#[from] link_bus::ConfigError),

    #[error("low-level: {0}")]
    LowLevel(#[from] link_lowlevel::ConfigError),

    #[error("telemetry: {0}")]
    Telemetry(#[from] link_telemetry::ConfigError),
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `LINK_REQUEST_TIMEOUT_MS`: default call timeout (default: 5000)
    /// - `LINK_TEARDOWN_GRACE_MS`: deferred unsubscribe grace (default: 1000)
    /// - `LINK_COMMAND_INTERVAL_MS`: low-level command period (default: 2)
    /// - `LINK_STATE_RATE`: `hf` or `lf` (default: hf)
    /// - `LINK_SERVICE_STATUS`: `inverted` or `as_reported` (default: inverted)
    /// - `LINK_SPORT_STATE_RATE`: `hf`, `mf` or `lf` (default: lf)
    /// - telemetry variables, see [`TelemetryConfig::from_env`]
    ///
    /// Unparseable values are logged and replaced by the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self {
            telemetry: TelemetryConfig::from_lookup(&lookup),
            ..Self::default()
        };

        if let Some(timeout) = parse_var(&lookup, "LINK_REQUEST_TIMEOUT_MS", parse_millis) {
            config.correlator.default_timeout = timeout;
        }
        if let Some(grace) = parse_var(&lookup, "LINK_TEARDOWN_GRACE_MS", parse_millis) {
            config.multiplexer.teardown_grace = grace;
        }
        if let Some(interval) = parse_var(&lookup, "LINK_COMMAND_INTERVAL_MS", parse_millis) {
            config.low_level.command_interval = interval;
        }
        if let Some(rate) = parse_var(&lookup, "LINK_STATE_RATE", |v| {
            StateRate::from_str(v).map_err(|e| e.to_string())
        }) {
            config.low_level.state_rate = rate;
        }
        if let Some(policy) = parse_var(&lookup, "LINK_SERVICE_STATUS", parse_status_policy) {
            config.service_status = policy;
        }
        if let Some(rate) = parse_var(&lookup, "LINK_SPORT_STATE_RATE", |v| {
            SportStateRate::from_str(v).map_err(|e| e.to_string())
        }) {
            config.sport_state_rate = rate;
        }
        config
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.correlator.validate()?;
        self.multiplexer.validate()?;
        self.low_level.validate()?;
        self.telemetry.validate()?;
        Ok(())
    }
}

/// Read and parse `key`. A present but unparseable value is logged and
/// ignored.
fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    parse: impl Fn(&str) -> Result<T, String>,
) -> Option<T> {
    let raw = lookup(key)?;
    match parse(raw.trim()) {
        Ok(value) => Some(value),
        Err(reason) => {
            warn!(variable = key, value = %raw, %reason, "Ignoring invalid setting, using default");
            None
        }
    }
}

fn parse_millis(value: &str) -> Result<Duration, String> {
    value
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| e.to_string())
}

fn parse_status_policy(value: &str) -> Result<ServiceStatusPolicy, String> {
    match value.to_ascii_lowercase().as_str() {
        "inverted" | "invert" => Ok(ServiceStatusPolicy::InvertRemoteFlag),
        "as_reported" | "reported" => Ok(ServiceStatusPolicy::AsReported),
        other => Err(format!("unknown policy {other:?}")),
    }
}
