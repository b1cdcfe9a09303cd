//! This module contains utilities for testing.

use crate::error::HalError;
use crate::hal::{AxisRemap, Hal, Indicator};

/// A constant defining the tolerance within which floating-point values
/// are considered close enough to be equal.
pub const TEST_TOLERANCE: f32 = 1e-5;

/// Checks if two floating point numbers are close enough to be considered
/// equal.
pub fn value_close(target: f32, value: f32) -> bool {
    (target - value).abs() < TEST_TOLERANCE
}

/// Checks if each of the components in a vector is close enough to
/// be considered equal.
pub fn vector_close(target: [f32; 3], value: [f32; 3]) -> bool {
    value_close(target[0], value[0])
        && value_close(target[1], value[1])
        && value_close(target[2], value[2])
}

/// Scripted board: sensors return fixed values, outputs are recorded.
pub struct MockHal {
    pub duties: [u16; 4],
    pub duty_writes: usize,
    pub indicator: Option<Indicator>,
    pub battery: u16,
    pub gyro: [f32; 3],
    pub accel: [f32; 3],
    pub imu_fault: Option<HalError>,
    /// False once the accel half of a burst has been consumed.
    pub accel_ready: bool,
}

impl Default for MockHal {
    fn default() -> Self {
        Self {
            duties: [0; 4],
            duty_writes: 0,
            indicator: None,
            // 4200 mV with the default gauge
            battery: 2_330,
            gyro: [0.0; 3],
            accel: [0.0, 0.0, 1.0],
            imu_fault: None,
            accel_ready: true,
        }
    }
}

impl Hal for MockHal {
    const AXIS_REMAP: AxisRemap = AxisRemap::IDENTITY;

    fn output_duty(&mut self, motor: usize, duty: u16) {
        self.duties[motor] = duty;
        self.duty_writes += 1;
    }

    fn battery_raw(&mut self) -> u16 {
        self.battery
    }

    fn set_indicator(&mut self, state: Indicator) {
        self.indicator = Some(state);
    }

    fn read_gyro(&mut self) -> Result<[f32; 3], HalError> {
        if let Some(err) = self.imu_fault {
            return Err(err);
        }
        Ok(self.gyro)
    }

    fn read_accel(&mut self) -> Result<[f32; 3], HalError> {
        if let Some(err) = self.imu_fault {
            return Err(err);
        }
        if !self.accel_ready {
            return Err(HalError::NotReady);
        }
        Ok(self.accel)
    }
}
