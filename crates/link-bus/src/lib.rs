//! # Link Bus - Transport Adapter and Subscription Multiplexer
//!
//! ## Layers
//!
//! ```text
//! ┌──────────────────────┐  add_callback / remove_callback
//! │ Correlator, clients  │ ─────────────────────────────┐
//! └──────────────────────┘                              ▼
//!                                      ┌─────────────────────────────┐
//!                                      │  SubscriptionMultiplexer    │
//!                                      │  N callbacks → 1 physical   │
//!                                      └─────────────────────────────┘
//!                                                     │ subscribe / unsubscribe
//!                                                     ▼
//!                                      ┌─────────────────────────────┐
//!                                      │  Transport (InMemory, ...)  │
//!                                      └─────────────────────────────┘
//! ```
//!
//! The transport handle is created once per process and shared by `Arc`.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod memory;
pub mod multiplexer;
pub mod transport;

pub use config::{ConfigError, MultiplexerConfig};
pub use memory::InMemoryTransport;
pub use multiplexer::{CallbackId, RemoveOutcome, SubscriptionMultiplexer};
pub use transport::{handler, MessageHandler, SubscriptionHandle, Transport};

/// Grace window before an unused physical subscription is torn down.
pub const DEFAULT_TEARDOWN_GRACE_MS: u64 = 1_000;
