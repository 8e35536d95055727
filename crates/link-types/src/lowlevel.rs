//! # Low-Level Records
//!
//! Command and state records for the high-frequency joint channel. Field
//! order here is the logical order; the checksum framer in `link-lowlevel`
//! owns the wire order and per-block endianness.
//!
//! Zero values come from hand-written `Default` impls. Fixed arrays longer
//! than 32 elements have no derived `Default`, so every record spells its
//! zero value out.

/// Joint blocks carried in every frame. Only the first 12 drive real joints.
pub const MOTOR_COUNT: usize = 20;
/// Actuated joints on the remote side.
pub const ACTIVE_JOINTS: usize = 12;
/// Frame header bytes expected by the firmware.
pub const FRAME_HEAD: [u8; 2] = [0xFE, 0xEF];
/// `level_flag` for low-level control.
pub const LEVEL_FLAG_LOW: u8 = 0xFF;
/// Position target meaning "hold no position".
pub const POS_STOP_F: f32 = 2.146e9;
/// Velocity target meaning "hold no velocity".
pub const VEL_STOP_F: f32 = 16000.0;

/// Per-joint command block.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotorCmd {
    pub mode: u8,
    pub q: f32,
    pub dq: f32,
    pub tau: f32,
    pub kp: f32,
    pub kd: f32,
    pub reserve: [u32; 3],
}

impl MotorCmd {
    /// Servo mode with no position or velocity target and zero gains.
    #[must_use]
    pub fn passive() -> Self {
        Self {
            mode: 0x01,
            q: POS_STOP_F,
            dq: VEL_STOP_F,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BmsCmd {
    pub off: u8,
    pub reserve: [u8; 3],
}

/// Outgoing low-level command.
#[derive(Debug, Clone, PartialEq)]
pub struct LowCmd {
    pub head: [u8; 2],
    pub level_flag: u8,
    pub frame_reserve: u8,
    pub sn: [u32; 2],
    pub version: [u32; 2],
    pub bandwidth: u16,
    pub motor_cmd: [MotorCmd; MOTOR_COUNT],
    pub bms_cmd: BmsCmd,
    pub wireless_remote: [u8; 40],
    pub led: [u8; 12],
    pub fan: [u8; 2],
    pub gpio: u8,
    pub reserve: u32,
    /// Checksum over the framed record; not itself part of the frame.
    pub crc: u32,
}

impl Default for LowCmd {
    fn default() -> Self {
        Self {
            head: [0; 2],
            level_flag: 0,
            frame_reserve: 0,
            sn: [0; 2],
            version: [0; 2],
            bandwidth: 0,
            motor_cmd: [MotorCmd::default(); MOTOR_COUNT],
            bms_cmd: BmsCmd::default(),
            wireless_remote: [0; 40],
            led: [0; 12],
            fan: [0; 2],
            gpio: 0,
            reserve: 0,
            crc: 0,
        }
    }
}

impl LowCmd {
    /// Zero command carrying the firmware header and the low-level flag.
    #[must_use]
    pub fn with_header() -> Self {
        Self {
            head: FRAME_HEAD,
            level_flag: LEVEL_FLAG_LOW,
            ..Self::default()
        }
    }

    /// Put every active joint into passive servo mode.
    pub fn set_passive(&mut self) {
        for motor in self.motor_cmd.iter_mut().take(ACTIVE_JOINTS) {
            *motor = MotorCmd::passive();
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImuState {
    pub quaternion: [f32; 4],
    pub gyroscope: [f32; 3],
    pub accelerometer: [f32; 3],
    pub rpy: [f32; 3],
    pub temperature: i8,
}

/// Per-joint state block.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotorState {
    pub mode: u8,
    pub q: f32,
    pub dq: f32,
    pub ddq: f32,
    pub tau_est: f32,
    pub q_raw: f32,
    pub dq_raw: f32,
    pub ddq_raw: f32,
    pub temperature: i8,
    pub lost: u32,
    pub reserve: [u32; 2],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BmsState {
    pub version_high: u8,
    pub version_low: u8,
    pub status: u8,
    pub soc: u8,
    pub current: i32,
    pub cycle: u16,
    pub bq_ntc: [i8; 2],
    pub mcu_ntc: [i8; 2],
    pub cell_vol: [u16; 15],
}

/// Incoming low-level state.
#[derive(Debug, Clone, PartialEq)]
pub struct LowState {
    pub head: [u8; 2],
    pub level_flag: u8,
    pub frame_reserve: u8,
    pub sn: [u32; 2],
    pub version: [u32; 2],
    pub bandwidth: u16,
    pub imu_state: ImuState,
    pub motor_state: [MotorState; MOTOR_COUNT],
    pub bms_state: BmsState,
    pub foot_force: [i16; 4],
    pub foot_force_est: [i16; 4],
    pub tick: u32,
    pub wireless_remote: [u8; 40],
    pub bit_flag: u8,
    pub adc_reel: f32,
    pub temperature_ntc1: i8,
    pub temperature_ntc2: i8,
    pub power_v: f32,
    pub power_a: f32,
    pub fan_frequency: [u16; 4],
    pub reserve: u32,
    /// Checksum carried by the sender.
    pub crc: u32,
}

impl Default for LowState {
    fn default() -> Self {
        Self {
            head: [0; 2],
            level_flag: 0,
            frame_reserve: 0,
            sn: [0; 2],
            version: [0; 2],
            bandwidth: 0,
            imu_state: ImuState::default(),
            motor_state: [MotorState::default(); MOTOR_COUNT],
            bms_state: BmsState::default(),
            foot_force: [0; 4],
            foot_force_est: [0; 4],
            tick: 0,
            wireless_remote: [0; 40],
            bit_flag: 0,
            adc_reel: 0.0,
            temperature_ntc1: 0,
            temperature_ntc2: 0,
            power_v: 0.0,
            power_a: 0.0,
            fan_frequency: [0; 4],
            reserve: 0,
            crc: 0,
        }
    }
}
