//! # Sport Client
//!
//! High-level motions on `rt/api/sport/request`. Parameters are range
//! checked locally; an out-of-range value never reaches the transport.

use link_rpc::CallOutcome;
use link_types::LinkResult;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::instrument;

use crate::api::sport as api;
use crate::service::{check_range, flag, Ack, DataParam, ServiceClient};

/// Roll and pitch limit, radians.
pub const MAX_TILT_RAD: f64 = 0.75;
/// Yaw limit, radians.
pub const MAX_YAW_RAD: f64 = 0.6;
/// Linear velocity range, m/s.
pub const LINEAR_VELOCITY: (f64, f64) = (-2.5, 5.0);
/// Angular velocity range, rad/s.
pub const ANGULAR_VELOCITY: (f64, f64) = (-4.0, 4.0);
/// Body height: accepted centimetres and the relative metres they map onto.
pub const BODY_HEIGHT_CM: (f64, f64) = (20.0, 35.0);
pub const BODY_HEIGHT_M: (f64, f64) = (-0.18, 0.03);
/// Foot raise height: accepted centimetres and the relative metres they map onto.
pub const FOOT_RAISE_CM: (f64, f64) = (5.0, 12.0);
pub const FOOT_RAISE_M: (f64, f64) = (-0.06, 0.03);
/// Highest gait enumeration value.
pub const MAX_GAIT: u8 = 4;

/// Keys requested by [`SportClient::get_state`].
pub const STATE_KEYS: [&str; 5] = ["state", "gait", "dance", "continuousGait", "economicGait"];

/// Motions that take no parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SportMotion {
    Damp,
    BalanceStand,
    StopMove,
    StandUp,
    StandDown,
    RecoveryStand,
    Sit,
    RiseSit,
    Trigger,
    Hello,
    Stretch,
    TrajectoryFollow,
    Content,
    Wallow,
    Dance1,
    Dance2,
    Scrape,
    FrontFlip,
    FrontJump,
    FrontPounce,
    WiggleHips,
    FingerHeart,
    LeadFollow,
    Handstand,
    CrossStep,
    OnesidedStep,
    Bound,
}

impl SportMotion {
    #[must_use]
    pub fn api_id(self) -> u32 {
        match self {
            SportMotion::Damp => api::DAMP,
            SportMotion::BalanceStand => api::BALANCE_STAND,
            SportMotion::StopMove => api::STOP_MOVE,
            SportMotion::StandUp => api::STAND_UP,
            SportMotion::StandDown => api::STAND_DOWN,
            SportMotion::RecoveryStand => api::RECOVERY_STAND,
            SportMotion::Sit => api::SIT,
            SportMotion::RiseSit => api::RISE_SIT,
            SportMotion::Trigger => api::TRIGGER,
            SportMotion::Hello => api::HELLO,
            SportMotion::Stretch => api::STRETCH,
            SportMotion::TrajectoryFollow => api::TRAJECTORY_FOLLOW,
            SportMotion::Content => api::CONTENT,
            SportMotion::Wallow => api::WALLOW,
            SportMotion::Dance1 => api::DANCE1,
            SportMotion::Dance2 => api::DANCE2,
            SportMotion::Scrape => api::SCRAPE,
            SportMotion::FrontFlip => api::FRONT_FLIP,
            SportMotion::FrontJump => api::FRONT_JUMP,
            SportMotion::FrontPounce => api::FRONT_POUNCE,
            SportMotion::WiggleHips => api::WIGGLE_HIPS,
            SportMotion::FingerHeart => api::FINGER_HEART,
            SportMotion::LeadFollow => api::LEAD_FOLLOW,
            SportMotion::Handstand => api::HANDSTAND,
            SportMotion::CrossStep => api::CROSS_STEP,
            SportMotion::OnesidedStep => api::ONESIDED_STEP,
            SportMotion::Bound => api::BOUND,
        }
    }

    /// Motions the remote only accepts in the advanced mode.
    #[must_use]
    pub fn requires_advanced_mode(self) -> bool {
        matches!(
            self,
            SportMotion::Handstand
                | SportMotion::CrossStep
                | SportMotion::OnesidedStep
                | SportMotion::Bound
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AngleUnit {
    #[default]
    Degrees,
    Radians,
}

/// `{x, y, z}`: roll/pitch/yaw for `Euler`, velocities for `Move`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Decoded `GetState` reply; a key the remote omitted stays `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SportStateReport {
    pub state: Option<Value>,
    pub gait: Option<Value>,
    pub dance: Option<Value>,
    pub continuous_gait: Option<Value>,
    pub economic_gait: Option<Value>,
}

impl SportStateReport {
    /// Pick `payload[key]["data"]` for every requested key.
    fn from_payload(payload: &HashMap<String, Value>) -> Self {
        let pick = |key: &str| payload.get(key).and_then(|v| v.get("data")).cloned();
        Self {
            state: pick("state"),
            gait: pick("gait"),
            dance: pick("dance"),
            continuous_gait: pick("continuousGait"),
            economic_gait: pick("economicGait"),
        }
    }
}

/// Linear interpolation of `value` from `from` onto `to`.
fn map_linear(value: f64, from: (f64, f64), to: (f64, f64)) -> f64 {
    to.0 + (to.1 - to.0) * ((value - from.0) / (from.1 - from.0))
}

#[derive(Clone)]
pub struct SportClient {
    service: ServiceClient,
}

impl SportClient {
    pub fn new(service: ServiceClient) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &ServiceClient {
        &self.service
    }

    /// Run a parameterless motion.
    #[instrument(skip(self))]
    pub async fn perform(&self, motion: SportMotion, ack: Ack) -> LinkResult<CallOutcome> {
        self.service.command::<()>(motion.api_id(), None, ack).await
    }

    /// Set body attitude. Radian input is range-checked; degree input is
    /// converted and sent as is, leaving limits to the remote.
    #[instrument(skip(self))]
    pub async fn euler(
        &self,
        roll: f64,
        pitch: f64,
        yaw: f64,
        unit: AngleUnit,
        ack: Ack,
    ) -> LinkResult<CallOutcome> {
        let attitude = match unit {
            AngleUnit::Degrees => Vector3 {
                x: roll.to_radians(),
                y: pitch.to_radians(),
                z: yaw.to_radians(),
            },
            AngleUnit::Radians => Vector3 {
                x: check_range("roll", roll, -MAX_TILT_RAD, MAX_TILT_RAD)?,
                y: check_range("pitch", pitch, -MAX_TILT_RAD, MAX_TILT_RAD)?,
                z: check_range("yaw", yaw, -MAX_YAW_RAD, MAX_YAW_RAD)?,
            },
        };
        self.service.command(api::EULER, Some(&attitude), ack).await
    }

    /// Walk with the given velocities (m/s, m/s, rad/s).
    #[instrument(skip(self))]
    pub async fn move_velocity(
        &self,
        vx: f64,
        vy: f64,
        vyaw: f64,
        ack: Ack,
    ) -> LinkResult<CallOutcome> {
        let velocity = Vector3 {
            x: check_range("x speed", vx, LINEAR_VELOCITY.0, LINEAR_VELOCITY.1)?,
            y: check_range("y speed", vy, LINEAR_VELOCITY.0, LINEAR_VELOCITY.1)?,
            z: check_range("z speed", vyaw, ANGULAR_VELOCITY.0, ANGULAR_VELOCITY.1)?,
        };
        self.service.command(api::MOVE, Some(&velocity), ack).await
    }

    #[instrument(skip(self))]
    pub async fn switch_gait(&self, gait: u8, ack: Ack) -> LinkResult<CallOutcome> {
        let gait = check_range("gait", gait, 0, MAX_GAIT)?;
        self.service
            .command(api::SWITCH_GAIT, Some(&DataParam::new(gait)), ack)
            .await
    }

    /// Absolute body height in centimetres.
    #[instrument(skip(self))]
    pub async fn body_height(&self, height_cm: f64, ack: Ack) -> LinkResult<CallOutcome> {
        let cm = check_range("body height", height_cm, BODY_HEIGHT_CM.0, BODY_HEIGHT_CM.1)?;
        let meters = map_linear(cm, BODY_HEIGHT_CM, BODY_HEIGHT_M);
        self.service
            .command(api::BODY_HEIGHT, Some(&DataParam::new(meters)), ack)
            .await
    }

    /// Absolute foot raise height in centimetres.
    #[instrument(skip(self))]
    pub async fn foot_raise_height(&self, height_cm: f64, ack: Ack) -> LinkResult<CallOutcome> {
        let cm = check_range("foot raise height", height_cm, FOOT_RAISE_CM.0, FOOT_RAISE_CM.1)?;
        let meters = map_linear(cm, FOOT_RAISE_CM, FOOT_RAISE_M);
        self.service
            .command(api::FOOT_RAISE_HEIGHT, Some(&DataParam::new(meters)), ack)
            .await
    }

    /// `-1` slow, `0` normal, `1` fast.
    #[instrument(skip(self))]
    pub async fn speed_level(&self, level: i8, ack: Ack) -> LinkResult<CallOutcome> {
        let level = check_range("speed level", level, -1, 1)?;
        self.service
            .command(api::SPEED_LEVEL, Some(&DataParam::new(level)), ack)
            .await
    }

    #[instrument(skip(self))]
    pub async fn switch_joystick(&self, on: bool, ack: Ack) -> LinkResult<CallOutcome> {
        self.service
            .command(api::SWITCH_JOYSTICK, Some(&flag(on)), ack)
            .await
    }

    #[instrument(skip(self))]
    pub async fn continuous_gait(&self, on: bool, ack: Ack) -> LinkResult<CallOutcome> {
        self.service
            .command(api::CONTINUOUS_GAIT, Some(&flag(on)), ack)
            .await
    }

    #[instrument(skip(self))]
    pub async fn pose(&self, on: bool, ack: Ack) -> LinkResult<CallOutcome> {
        self.service.command(api::POSE, Some(&flag(on)), ack).await
    }

    #[instrument(skip(self))]
    pub async fn economic_gait(&self, on: bool, ack: Ack) -> LinkResult<CallOutcome> {
        self.service
            .command(api::ECONOMIC_GAIT, Some(&flag(on)), ack)
            .await
    }

    /// Query state, gait, dance and gait flags.
    #[instrument(skip(self))]
    pub async fn get_state(&self) -> LinkResult<SportStateReport> {
        let payload: HashMap<String, Value> = self
            .service
            .request_data(api::GET_STATE, Some(&STATE_KEYS))
            .await?;
        Ok(SportStateReport::from_payload(&payload))
    }
}
