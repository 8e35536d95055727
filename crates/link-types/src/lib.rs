//! # Link Types Crate
//!
//! Domain vocabulary shared by the transport, the correlator and the
//! low-level channel.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every record that crosses the transport is
//!   defined here, once.
//! - **Closed Message Set**: the transport carries a [`BusMessage`]; each topic
//!   is bound to exactly one [`MessageKind`].
//! - **Explicit Zero Values**: low-level records are constructed through
//!   `Default`, never by walking field metadata at runtime.

pub mod envelope;
pub mod errors;
pub mod lowlevel;
pub mod message;
pub mod sport_state;
pub mod status;
pub mod topics;

pub use envelope::{
    RequestEnvelope, RequestHeader, RequestIdentity, RequestLease, RequestPolicy,
    ResponseEnvelope, ResponseHeader, ResponseStatus,
};
pub use errors::{LinkError, LinkResult, TransportError};
pub use lowlevel::{BmsCmd, BmsState, ImuState, LowCmd, LowState, MotorCmd, MotorState};
pub use message::{BusMessage, MessageKind};
pub use sport_state::{PathPoint, SportModeState, TimeSpec};
pub use status::describe_status;
pub use topics::response_topic_for;
