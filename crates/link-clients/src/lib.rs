//! # Link Clients Crate
//!
//! Typed clients for the actuator's request/reply services. Each client owns
//! a [`ServiceClient`] bound to one request topic; all of them share the
//! process's single [`Correlator`](link_rpc::Correlator).
//!
//! ```text
//! SportClient ──┐
//! MotionSwitcherClient ──┼──▶ ServiceClient ──▶ Correlator ──▶ Transport
//! RobotStateClient ──┘
//!
//! SportStateClient ──▶ SubscriptionMultiplexer ──▶ rt/{,mf/,lf/}sportmodestate
//! ```
//!
//! Parameters are validated before anything is published; a violation is
//! `LinkError::InvalidRequest`.

pub mod api;
pub mod motion_switcher;
pub mod robot_state;
pub mod service;
pub mod sport;
pub mod sport_state;

pub use api::Service;
pub use motion_switcher::{ModeInfo, MotionSwitcherClient};
pub use robot_state::{
    parse_service_list, RobotStateClient, ServiceListReceiver, ServiceState, ServiceStatusPolicy,
};
pub use service::{Ack, DataParam, ServiceClient};
pub use sport::{AngleUnit, SportClient, SportMotion, SportStateReport};
pub use sport_state::{SportStateClient, SportStateRate, SportStateReceiver};
