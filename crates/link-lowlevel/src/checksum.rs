//! # Checksum Framer
//!
//! CRC-32/MPEG-2 over the firmware's canonical byte layout of a low-level
//! record.
//!
//! ## Algorithm
//!
//! Polynomial `0x04C11DB7`, initial value `0xFFFFFFFF`, no reflection, no
//! final XOR, MSB first (`crc::CRC_32_MPEG_2`). Check value for
//! `"123456789"` is `0x0376E6E7`.
//!
//! ## Frame layout
//!
//! The frame is a sequence of 4-byte-aligned blocks of two kinds:
//!
//! - **swapped**: fields packed little-endian, then each 4-byte group
//!   reversed (byte-sized fields and short arrays);
//! - **straight**: 32-bit values written big-endian (floats, counters,
//!   reserved words).
//!
//! ```text
//! LowCmd (808 bytes)
//!   swapped   head[2] level_flag frame_reserve
//!   straight  sn[2] version[2]
//!   swapped   bandwidth:u16 pad[2]
//!   20 ×      swapped  mode pad[3]
//!             straight q dq tau kp kd reserve[3]
//!   swapped   bms.off bms.reserve[3]
//!   swapped   wireless_remote[40] led[12] fan[2] gpio pad[1]
//!   straight  reserve
//!
//! LowState (1176 bytes)
//!   swapped   head[2] level_flag frame_reserve
//!   straight  sn[2] version[2]
//!   swapped   bandwidth:u16 pad[2]
//!   straight  imu quaternion[4] gyroscope[3] accelerometer[3] rpy[3]
//!   swapped   imu.temperature pad[3]
//!   20 ×      swapped  mode pad[3]
//!             straight q dq ddq tau_est q_raw dq_raw ddq_raw
//!             swapped  temperature pad[3]
//!             straight lost reserve[2]
//!   swapped   bms version_high version_low status soc
//!   straight  bms.current
//!   swapped   bms cycle:u16 bq_ntc[2] mcu_ntc[2] cell_vol[15]:u16
//!   swapped   foot_force[4]:i16 foot_force_est[4]:i16
//!   straight  tick
//!   swapped   wireless_remote[40] bit_flag pad[3]
//!   straight  adc_reel
//!   swapped   temperature_ntc1 temperature_ntc2 pad[2]
//!   straight  power_v power_a
//!   swapped   fan_frequency[4]:u16
//!   straight  reserve
//! ```
//!
//! The `crc` field is never part of the frame.

use crc::{Crc, Digest, CRC_32_MPEG_2};
use link_types::lowlevel::MOTOR_COUNT;
use link_types::{LinkError, LowCmd, LowState};

/// Framed length of a [`LowCmd`].
pub const LOW_CMD_FRAME_LEN: usize = 808;
/// Framed length of a [`LowState`].
pub const LOW_STATE_FRAME_LEN: usize = 1176;

/// CRC-32/MPEG-2 engine shared by every frame.
pub static CRC32_MPEG2: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// CRC-32/MPEG-2 of a byte buffer.
#[must_use]
pub fn checksum_bytes(bytes: &[u8]) -> u32 {
    CRC32_MPEG2.checksum(bytes)
}

/// Destination for framed bytes: a hasher, or a buffer for inspection.
pub trait FrameSink {
    fn put(&mut self, bytes: &[u8]);

    /// Emit `block` with each 4-byte group reversed.
    fn put_swapped<const N: usize>(&mut self, block: [u8; N]) {
        debug_assert_eq!(N % 4, 0, "swapped blocks are whole words");
        for word in block.chunks_exact(4) {
            self.put(&[word[3], word[2], word[1], word[0]]);
        }
    }

    fn put_u32(&mut self, value: u32) {
        self.put(&value.to_be_bytes());
    }

    fn put_i32(&mut self, value: i32) {
        self.put(&value.to_be_bytes());
    }

    fn put_f32(&mut self, value: f32) {
        self.put(&value.to_be_bytes());
    }
}

impl FrameSink for Digest<'_, u32> {
    fn put(&mut self, bytes: &[u8]) {
        self.update(bytes);
    }
}

impl FrameSink for Vec<u8> {
    fn put(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// A record with a fixed checksum frame.
pub trait Framed {
    /// Framed length in bytes.
    const FRAME_LEN: usize;

    fn encode<S: FrameSink>(&self, sink: &mut S);

    /// Checksum over the frame.
    fn checksum(&self) -> u32 {
        let mut digest = CRC32_MPEG2.digest();
        self.encode(&mut digest);
        digest.finalize()
    }

    /// The frame as bytes.
    fn frame_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::FRAME_LEN);
        self.encode(&mut buf);
        buf
    }
}

/// Little-endian packing of `u16` values into a byte block.
fn pack_u16<const N: usize>(out: &mut [u8; N], offset: usize, values: &[u16]) {
    for (i, v) in values.iter().enumerate() {
        out[offset + 2 * i..offset + 2 * i + 2].copy_from_slice(&v.to_le_bytes());
    }
}

fn header_block(head: [u8; 2], level_flag: u8, frame_reserve: u8) -> [u8; 4] {
    [head[0], head[1], level_flag, frame_reserve]
}

fn bandwidth_block(bandwidth: u16) -> [u8; 4] {
    let [lo, hi] = bandwidth.to_le_bytes();
    [lo, hi, 0, 0]
}

fn byte_block(b: u8) -> [u8; 4] {
    [b, 0, 0, 0]
}

impl Framed for LowCmd {
    const FRAME_LEN: usize = LOW_CMD_FRAME_LEN;

    fn encode<S: FrameSink>(&self, sink: &mut S) {
        sink.put_swapped(header_block(self.head, self.level_flag, self.frame_reserve));
        for v in self.sn.iter().chain(&self.version) {
            sink.put_u32(*v);
        }
        sink.put_swapped(bandwidth_block(self.bandwidth));

        for motor in &self.motor_cmd {
            sink.put_swapped(byte_block(motor.mode));
            for v in [motor.q, motor.dq, motor.tau, motor.kp, motor.kd] {
                sink.put_f32(v);
            }
            for v in motor.reserve {
                sink.put_u32(v);
            }
        }

        let bms = &self.bms_cmd;
        sink.put_swapped([bms.off, bms.reserve[0], bms.reserve[1], bms.reserve[2]]);

        let mut aux = [0u8; 56];
        aux[..40].copy_from_slice(&self.wireless_remote);
        aux[40..52].copy_from_slice(&self.led);
        aux[52..54].copy_from_slice(&self.fan);
        aux[54] = self.gpio;
        sink.put_swapped(aux);

        sink.put_u32(self.reserve);
    }
}

impl Framed for LowState {
    const FRAME_LEN: usize = LOW_STATE_FRAME_LEN;

    fn encode<S: FrameSink>(&self, sink: &mut S) {
        sink.put_swapped(header_block(self.head, self.level_flag, self.frame_reserve));
        for v in self.sn.iter().chain(&self.version) {
            sink.put_u32(*v);
        }
        sink.put_swapped(bandwidth_block(self.bandwidth));

        let imu = &self.imu_state;
        for v in imu
            .quaternion
            .iter()
            .chain(&imu.gyroscope)
            .chain(&imu.accelerometer)
            .chain(&imu.rpy)
        {
            sink.put_f32(*v);
        }
        sink.put_swapped(byte_block(imu.temperature as u8));

        debug_assert_eq!(self.motor_state.len(), MOTOR_COUNT);
        for motor in &self.motor_state {
            sink.put_swapped(byte_block(motor.mode));
            for v in [
                motor.q,
                motor.dq,
                motor.ddq,
                motor.tau_est,
                motor.q_raw,
                motor.dq_raw,
                motor.ddq_raw,
            ] {
                sink.put_f32(v);
            }
            sink.put_swapped(byte_block(motor.temperature as u8));
            sink.put_u32(motor.lost);
            for v in motor.reserve {
                sink.put_u32(v);
            }
        }

        let bms = &self.bms_state;
        sink.put_swapped([bms.version_high, bms.version_low, bms.status, bms.soc]);
        sink.put_i32(bms.current);
        let mut cells = [0u8; 36];
        pack_u16(&mut cells, 0, &[bms.cycle]);
        cells[2] = bms.bq_ntc[0] as u8;
        cells[3] = bms.bq_ntc[1] as u8;
        cells[4] = bms.mcu_ntc[0] as u8;
        cells[5] = bms.mcu_ntc[1] as u8;
        pack_u16(&mut cells, 6, &bms.cell_vol);
        sink.put_swapped(cells);

        let mut feet = [0u8; 16];
        for (i, v) in self.foot_force.iter().chain(&self.foot_force_est).enumerate() {
            feet[2 * i..2 * i + 2].copy_from_slice(&v.to_le_bytes());
        }
        sink.put_swapped(feet);

        sink.put_u32(self.tick);

        let mut remote = [0u8; 44];
        remote[..40].copy_from_slice(&self.wireless_remote);
        remote[40] = self.bit_flag;
        sink.put_swapped(remote);

        sink.put_f32(self.adc_reel);
        sink.put_swapped([
            self.temperature_ntc1 as u8,
            self.temperature_ntc2 as u8,
            0,
            0,
        ]);
        sink.put_f32(self.power_v);
        sink.put_f32(self.power_a);

        let mut fans = [0u8; 8];
        pack_u16(&mut fans, 0, &self.fan_frequency);
        sink.put_swapped(fans);

        sink.put_u32(self.reserve);
    }
}

/// Checksum of an outgoing command.
#[must_use]
pub fn frame(cmd: &LowCmd) -> u32 {
    cmd.checksum()
}

/// Compute and store the checksum of `cmd`. Returns the stored value.
pub fn sign(cmd: &mut LowCmd) -> u32 {
    let crc = frame(cmd);
    cmd.crc = crc;
    crc
}

/// True if `state.crc` matches the checksum of its frame.
#[must_use]
pub fn verify(state: &LowState) -> bool {
    state.checksum() == state.crc
}

/// As [`verify`], reporting both values on mismatch.
///
/// # Errors
///
/// `ChecksumMismatch` if the carried and computed checksums differ.
pub fn verify_checked(state: &LowState) -> Result<(), LinkError> {
    let computed = state.checksum();
    if computed == state.crc {
        Ok(())
    } else {
        Err(LinkError::ChecksumMismatch {
            expected: state.crc,
            computed,
        })
    }
}

/// Compute and store the checksum of `state` (simulators and tests).
pub fn seal(state: &mut LowState) -> u32 {
    let crc = state.checksum();
    state.crc = crc;
    crc
}
