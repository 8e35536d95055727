//! # Link RPC - Request/Reply Correlation
//!
//! Turns a fire-and-forget publish into an awaitable call.
//!
//! ## Call flow
//!
//! ```text
//! call(topic, api_id, parameter)
//!   1. allocate correlation id (skips ids still pending)
//!   2. register Pending Call  ──────────────┐ oneshot
//!   3. add per-call callback on .../response │
//!   4. publish request on .../request       │
//!   5. await  ◀─────────────────────────────┘ complete(response) | timeout
//!   6. release callback (always, via drop guard)
//! ```
//!
//! Exactly one of response or timeout resolves a Pending Call: both race to
//! remove the same table entry and only the winner acts.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod correlation;
pub mod correlator;
pub mod pending;

pub use config::{ConfigError, CorrelatorConfig};
pub use correlation::{CorrelationId, IdAllocator};
pub use correlator::{CallOptions, CallOutcome, Correlator};
pub use pending::{PendingCallTable, PendingStats, StatsSnapshot};
