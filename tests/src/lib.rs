//! # Actuator Link Test Suite
//!
//! Unified test crate for flows that cross crate boundaries.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/integration/
//! │   ├── request_reply.rs   # clients → correlator → loopback actuator
//! │   ├── low_level.rs       # signed command stream, verified state
//! │   └── shutdown.rs        # ordered teardown with calls in flight
//! └── benches/
//!     └── link_benchmarks.rs # checksum framing, call round trip
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p link-tests
//! cargo test -p link-tests integration::low_level
//! cargo bench -p link-tests
//! ```

pub mod integration;
