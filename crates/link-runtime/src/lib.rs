//! # Actuator Link Runtime
//!
//! Process wiring for the actuator link.
//!
//! ## Modular Structure
//!
//! - `config` - environment-driven configuration for every component
//! - `runtime` - one transport handle shared by the multiplexer, correlator
//!   and clients; ordered shutdown
//! - `simulator` - loopback actuator answering requests and streaming state
//!
//! ```text
//!             ┌──────────────────── LinkRuntime ────────────────────┐
//!             │ SportClient  MotionSwitcherClient  RobotStateClient │
//!             │        └──────────┬──────────┘           │          │
//!             │              Correlator                  │          │
//!             │                   └──── Multiplexer ─────┤          │
//!             │ LowLevelClient ───────────────┘          │          │
//!             └─────────────────────── Transport ────────┘──────────┘
//!                                          │
//!                                  LoopbackActuator
//! ```

pub mod config;
pub mod runtime;
pub mod simulator;

pub use config::{ConfigError, RuntimeConfig};
pub use runtime::{LinkRuntime, ShutdownReport};
pub use simulator::{ActuatorStats, LoopbackActuator, Reply};
