//! # Link Telemetry
//!
//! Structured logging for the actuator link. Every crate logs through
//! `tracing` macros; this crate owns the one global subscriber.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use link_telemetry::{init_logging, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_logging(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `LINK_SERVICE_NAME` | `actuator-link` | Service name in log lines |
//! | `LINK_LOG_LEVEL` | `info` | Log filter (falls back to `RUST_LOG`) |
//! | `LINK_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `LINK_JSON_LOGS` | `false` | JSON lines instead of text |

mod config;
mod logging;

pub use config::{ConfigError, TelemetryConfig};
pub use logging::{build_filter, init_logging};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),

    #[error("A global tracing subscriber is already installed")]
    AlreadyInitialized,
}
