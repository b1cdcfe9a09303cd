//! Gyro bias calibration and the per-tick attitude estimate.
//!
//! Calibration runs alongside flight: samples are collected every tick and
//! the bias is swapped in only once the buffer is full. Until then the
//! previous bias (zero at boot) stays in effect.

use heapless::Vec;

use crate::config::{ACCEL_SCALE, CALIBRATION_SAMPLES, ROTATION_SCALE};
use crate::drivers::ahrs::{AttitudeFusion, EulerAngles};
use crate::error::HalError;
use crate::hal::Hal;

/// Raw gyro samples collected for one bias estimate.
pub struct CalibrationBuffer<const N: usize = CALIBRATION_SAMPLES> {
    samples: Vec<[f32; 3], N>,
    ready: bool,
    origin: [f32; 3],
}

impl<const N: usize> Default for CalibrationBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> CalibrationBuffer<N> {
    pub const fn new() -> Self {
        Self {
            samples: Vec::new(),
            ready: false,
            origin: [0.0; 3],
        }
    }

    /// Discards collected samples and starts over. The current bias is kept
    /// until the new run completes.
    pub fn restart(&mut self) {
        self.samples.clear();
        self.ready = false;
    }

    /// Adds a sample; returns `true` on the sample that completes the run.
    pub fn add(&mut self, sample: [f32; 3]) -> bool {
        if self.ready {
            return false;
        }
        if self.samples.push(sample).is_err() || self.samples.is_full() {
            self.origin = self.mean();
            self.samples.clear();
            self.ready = true;
            return true;
        }
        false
    }

    fn mean(&self) -> [f32; 3] {
        if self.samples.is_empty() {
            return self.origin;
        }
        let mut sum = [0.0f64; 3];
        for s in &self.samples {
            for (acc, v) in sum.iter_mut().zip(s) {
                *acc += *v as f64;
            }
        }
        let n = self.samples.len() as f64;
        sum.map(|s| (s / n) as f32)
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Gyro bias in deg/s, body frame.
    pub fn origin(&self) -> [f32; 3] {
        self.origin
    }
}

/// One tick's worth of attitude data.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AttitudeSample {
    /// Radians.
    pub angles: EulerAngles,
    /// De-biased body rate, centi-degrees per second (x, y, z).
    pub rotation: [i32; 3],
    /// Body acceleration, milli-g (x, y, z).
    pub accel: [i32; 3],
}

/// Turns raw IMU reads into a de-biased, fused attitude estimate.
pub struct AttitudeEstimator<F: AttitudeFusion> {
    fusion: F,
    calibration: CalibrationBuffer,
}

impl<F: AttitudeFusion> AttitudeEstimator<F> {
    /// Calibration starts immediately.
    pub fn new(fusion: F) -> Self {
        Self {
            fusion,
            calibration: CalibrationBuffer::new(),
        }
    }

    pub fn start_calibration(&mut self) {
        info!("gyro calibration started");
        self.calibration.restart();
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_ready()
    }

    pub fn bias(&self) -> [f32; 3] {
        self.calibration.origin()
    }

    pub fn fusion(&self) -> &F {
        &self.fusion
    }

    /// Samples the IMU once and advances the fusion filter by `dt` seconds.
    pub fn update<H: Hal>(&mut self, hal: &mut H, dt: f32) -> Result<AttitudeSample, HalError> {
        let gyro = H::AXIS_REMAP.apply(hal.read_gyro()?);
        let accel = H::AXIS_REMAP.apply(hal.read_accel()?);

        if self.calibration.add(gyro) {
            let [x, y, z] = self.calibration.origin();
            info!("gyro calibration done, bias = [{}, {}, {}] deg/s", x, y, z);
        }

        let bias = self.calibration.origin();
        let rate = [gyro[0] - bias[0], gyro[1] - bias[1], gyro[2] - bias[2]];

        let angles = self.fusion.update(rate, accel, dt);

        Ok(AttitudeSample {
            angles,
            rotation: rate.map(|v| (v * ROTATION_SCALE) as i32),
            accel: accel.map(|v| (v * ACCEL_SCALE) as i32),
        })
    }
}
