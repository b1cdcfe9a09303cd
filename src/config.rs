//! Tuning constants and the composition-time flight configuration.

use core::f32::consts::PI;

use embassy_time::Duration;

// ── Loop timing ───────────────────────────────────────────────────────────────

/// Control loop period: 200 Hz.
pub const CONTROL_LOOP_PERIOD_US: u64 = 5_000;
/// Link is considered lost when no valid datagram arrived for this long.
pub const COMM_TIMEOUT_MS: u64 = 300;

// ── Battery ───────────────────────────────────────────────────────────────────

/// Voltage at which battery compensation applies no scaling (1S LiPo full).
pub const BASE_BATTERY_MV: i32 = 4_200;
/// All motor output is suppressed at or below this voltage.
pub const SHUTOFF_BATTERY_MV: i32 = 2_700;
/// Moving-average window for the battery voltage.
pub const BATTERY_FILTER_WINDOW: usize = 100;

// ── IMU ───────────────────────────────────────────────────────────────────────

/// Raw gyro samples averaged into one bias estimate.
pub const CALIBRATION_SAMPLES: usize = 1_000;
/// deg/s → rotation register (centi-degrees per second).
pub const ROTATION_SCALE: f32 = 100.0;
/// g → acceleration register (milli-g).
pub const ACCEL_SCALE: f32 = 1_000.0;
/// Rotation register → derivative term input of the PD loop.
pub const RATE_FEEDBACK_SCALE: f32 = 1.0 / 100_000.0;

// ── Angles ────────────────────────────────────────────────────────────────────

/// Radians → angle register (tenths of a degree).
pub const ANGLE_REG_PER_RAD: f32 = 1_800.0 / PI;
/// Trim register LSB in radians (0.1 degree).
pub const TRIM_RAD_PER_LSB: f32 = PI / 180.0 * 0.1;

// ── Outputs ───────────────────────────────────────────────────────────────────

pub const MOTOR_COUNT: usize = 4;
/// Motor duties are 10-bit.
pub const MAX_DUTY: i32 = 1_023;
/// `TEST_MODE` value that hands the motors to the `OUT_Mx` registers.
pub const TEST_MODE_MAGIC: i16 = 0xA5;

// ── Register defaults ─────────────────────────────────────────────────────────

pub const DEFAULT_LIMITER: i16 = 600;
pub const DEFAULT_DESCEND_TIME_MS: i16 = 2_000;

/// Values a board may override when composing the control loop.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlightConfig {
    pub loop_period: Duration,
    pub comm_timeout: Duration,
    pub base_battery_mv: i32,
    pub shutoff_battery_mv: i32,
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self {
            loop_period: Duration::from_micros(CONTROL_LOOP_PERIOD_US),
            comm_timeout: Duration::from_millis(COMM_TIMEOUT_MS),
            base_battery_mv: BASE_BATTERY_MV,
            shutoff_battery_mv: SHUTOFF_BATTERY_MV,
        }
    }
}

impl FlightConfig {
    /// Loop period in seconds, as handed to the fusion filter.
    pub fn sample_interval(&self) -> f32 {
        self.loop_period.as_micros() as f32 * 1.0e-6
    }
}
