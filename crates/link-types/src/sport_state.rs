//! # Sport Mode State
//!
//! High-level state report published by the sport service on
//! `rt/sportmodestate` and its decimated `mf`/`lf` variants.

use crate::lowlevel::ImuState;

/// Number of planned trajectory points carried in each report.
pub const PATH_POINT_COUNT: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeSpec {
    pub sec: i32,
    pub nanosec: u32,
}

/// One point of the planned body trajectory.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PathPoint {
    pub t_from_start: f32,
    pub x: f32,
    pub y: f32,
    pub yaw: f32,
    pub vx: f32,
    pub vy: f32,
    pub vyaw: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SportModeState {
    pub stamp: TimeSpec,
    pub error_code: u32,
    pub imu_state: ImuState,
    pub mode: u8,
    pub progress: f32,
    pub gait_type: u8,
    pub foot_raise_height: f32,
    pub position: [f32; 3],
    pub body_height: f32,
    pub velocity: [f32; 3],
    pub yaw_speed: f32,
    pub range_obstacle: [f32; 4],
    pub foot_force: [i16; 4],
    pub foot_position_body: [f32; 12],
    pub foot_speed_body: [f32; 12],
    pub path_point: [PathPoint; PATH_POINT_COUNT],
}
