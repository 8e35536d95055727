//! # Link Low-Level - Checksummed Command/State Channel
//!
//! - [`checksum`]: CRC-32/MPEG-2 over the firmware's mixed-endian frame.
//! - [`periodic`]: fixed-interval tick loop with clean stop and failure
//!   accounting.
//! - [`client`]: signs and streams `LowCmd`, verifies and publishes
//!   `LowState`.
//!
//! A state record that fails verification is dropped and reported; it never
//! reaches consumers.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod checksum;
pub mod client;
pub mod config;
pub mod periodic;

pub use checksum::{
    checksum_bytes, frame, seal, sign, verify, verify_checked, FrameSink, Framed, CRC32_MPEG2,
    LOW_CMD_FRAME_LEN, LOW_STATE_FRAME_LEN,
};
pub use client::{LowLevelClient, LowLevelStats, StateReceiver};
pub use config::{ConfigError, LowLevelConfig, StateRate};
pub use periodic::{HealthCallback, PeriodicPublisher, PublisherHealth};
