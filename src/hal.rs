//! Board abstraction: everything the flight core needs from the hardware.
//!
//! Two source boards differed only in these wrappers (IMU mounting, battery
//! sense circuit, motor pins), so a board is one `Hal` impl plus a pair of
//! constants chosen at composition time.

use crate::error::HalError;

/// Status indicator states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Indicator {
    Ready,
    Calibrating,
}

/// Board I/O used by the control loop.
pub trait Hal {
    /// Sensor-to-body axis mapping for the IMU on this board.
    const AXIS_REMAP: AxisRemap;

    /// Drives motor `motor` (0..4) with a 10-bit duty.
    fn output_duty(&mut self, motor: usize, duty: u16);

    /// Raw battery ADC code.
    fn battery_raw(&mut self) -> u16;

    fn set_indicator(&mut self, state: Indicator);

    /// Angular rate in deg/s, sensor frame.
    fn read_gyro(&mut self) -> Result<[f32; 3], HalError>;

    /// Acceleration in g, sensor frame.
    fn read_accel(&mut self) -> Result<[f32; 3], HalError>;
}

// ── Axis remapping ────────────────────────────────────────────────────────────

/// One body axis taken from a sensor axis with a sign.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AxisSource {
    pub axis: usize,
    pub sign: f32,
}

/// Maps sensor axes onto the body frame (x forward, y left, z up).
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AxisRemap(pub [AxisSource; 3]);

impl AxisRemap {
    const fn src(axis: usize, sign: f32) -> AxisSource {
        AxisSource { axis, sign }
    }

    pub const IDENTITY: Self = Self([Self::src(0, 1.0), Self::src(1, 1.0), Self::src(2, 1.0)]);

    /// MPU6886 in the ATOM Matrix, USB connector facing you:
    /// x left+, y front+, z down+.
    pub const ATOM_MATRIX: Self = Self([Self::src(1, 1.0), Self::src(0, 1.0), Self::src(2, -1.0)]);

    /// AtomFly frame: x = +Y, y = -X, z = +Z.
    pub const ATOM_FLY: Self = Self([Self::src(1, 1.0), Self::src(0, -1.0), Self::src(2, 1.0)]);

    pub fn apply(&self, v: [f32; 3]) -> [f32; 3] {
        let pick = |s: &AxisSource| v[s.axis % 3] * s.sign;
        [pick(&self.0[0]), pick(&self.0[1]), pick(&self.0[2])]
    }
}

// ── Battery sense ─────────────────────────────────────────────────────────────

/// Affine ADC code → millivolt conversion, calibrated per board.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatteryGauge {
    pub slope: f32,
    pub offset: f32,
}

impl Default for BatteryGauge {
    fn default() -> Self {
        Self {
            slope: 1.8659,
            offset: -147.0441,
        }
    }
}

impl BatteryGauge {
    /// Reported by boards without a sense divider: mid-scale of a 12-bit ADC,
    /// which converts to a healthy-looking ~3.7 V.
    pub const FIXED_MIDSCALE_CODE: u16 = 2_048;

    pub fn to_millivolts(&self, adc: u16) -> i32 {
        (adc as f32 * self.slope + self.offset) as i32
    }
}
