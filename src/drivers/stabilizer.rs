//! # Attitude PD Stabilizer
//!
//! Converts the current attitude against a target into rudder, elevator and
//! aileron corrections. There is no integral term; the proportional error
//! for yaw and roll is folded onto the shorter arc.

use core::f32::consts::PI;

use piddiy::PidController;

use crate::config::RATE_FEEDBACK_SCALE;
use crate::drivers::ahrs::EulerAngles;
use crate::drivers::imu::AttitudeSample;

/// Folds an angle error into `[-π, π]` with a single `2π` correction.
pub fn wrap_angle(error: f32) -> f32 {
    if error > PI {
        error - 2.0 * PI
    } else if error < -PI {
        error + 2.0 * PI
    } else {
        error
    }
}

/// Actuator channels, in duty units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Control {
    pub throttle: i32,
    pub rudder: i32,
    pub elevator: i32,
    pub aileron: i32,
}

/// Proportional and derivative gain for one axis.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AxisGains {
    pub p: f32,
    pub d: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Gains {
    pub yaw: AxisGains,
    pub pitch: AxisGains,
    pub roll: AxisGains,
}

/// Control data for the angle PD compute callback.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AxisData {
    /// Current angle, radians.
    pub angle: f32,
    /// Scaled body rate relative to the reference pose.
    pub rate: f32,
    /// Fold the error onto the shorter arc.
    pub wrap: bool,
}

/// PD compute callback: error is `current - target`, derivative is the
/// measured rate, integral is always zero.
pub fn compute_pd(pid: &mut PidController<f32, AxisData>, data: AxisData) -> (f32, f32, f32) {
    let error = data.angle - pid.set_point;
    let error = if data.wrap { wrap_angle(error) } else { error };
    (error, 0.0, data.rate)
}

fn axis_controller() -> PidController<f32, AxisData> {
    let mut pid = PidController::new();
    pid.compute_fn(compute_pd).ki(0.0);
    pid
}

/// Three independent PD loops, one per attitude axis.
pub struct AttitudeController {
    yaw: PidController<f32, AxisData>,
    pitch: PidController<f32, AxisData>,
    roll: PidController<f32, AxisData>,
}

impl Default for AttitudeController {
    fn default() -> Self {
        Self::new()
    }
}

impl AttitudeController {
    pub fn new() -> Self {
        Self {
            yaw: axis_controller(),
            pitch: axis_controller(),
            roll: axis_controller(),
        }
    }

    /// Corrections for `sample` against `target`. Rates are taken relative
    /// to `origin`. Throttle is left at zero.
    pub fn feedback(
        &mut self,
        sample: &AttitudeSample,
        origin: &AttitudeSample,
        target: &EulerAngles,
        gains: &Gains,
    ) -> Control {
        let rate = |axis: usize| {
            (sample.rotation[axis] - origin.rotation[axis]) as f32 * RATE_FEEDBACK_SCALE
        };

        self.yaw.set_point(target.yaw).kp(gains.yaw.p).kd(gains.yaw.d);
        self.pitch.set_point(target.pitch).kp(gains.pitch.p).kd(gains.pitch.d);
        self.roll.set_point(target.roll).kp(gains.roll.p).kd(gains.roll.d);

        let rudder = self.yaw.compute(AxisData {
            angle: sample.angles.yaw,
            rate: rate(2),
            wrap: true,
        });
        let elevator = self.pitch.compute(AxisData {
            angle: sample.angles.pitch,
            rate: rate(1),
            wrap: false,
        });
        let aileron = self.roll.compute(AxisData {
            angle: sample.angles.roll,
            rate: rate(0),
            wrap: true,
        });

        Control {
            throttle: 0,
            rudder: rudder as i32,
            elevator: elevator as i32,
            aileron: aileron as i32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn sample(yaw: f32, pitch: f32, roll: f32, rotation: [i32; 3]) -> AttitudeSample {
        AttitudeSample {
            angles: EulerAngles { yaw, pitch, roll },
            rotation,
            accel: [0; 3],
        }
    }

    fn gains(p: f32, d: f32) -> Gains {
        let axis = AxisGains { p, d };
        Gains {
            yaw: axis,
            pitch: axis,
            roll: axis,
        }
    }

    #[test]
    fn test_wrap_angle_takes_shorter_arc() {
        let eps = 0.1;
        assert!(value_close(-(PI - eps), wrap_angle(PI + eps)));
        assert!(value_close(PI - eps, wrap_angle(-(PI + eps))));
        assert!(value_close(1.0, wrap_angle(1.0)));
        assert!(value_close(PI, wrap_angle(PI)));
    }

    #[test]
    fn test_compute_pd_terms() {
        let mut pid = PidController::new();
        pid.compute_fn(compute_pd).set_point(0.5).kp(10.0).ki(0.0).kd(2.0);
        let data = AxisData {
            angle: 0.7,
            rate: 3.0,
            wrap: false,
        };
        let (error, integral, derivative) = compute_pd(&mut pid, data);
        assert!(value_close(0.2, error));
        assert!(value_close(0.0, integral));
        assert!(value_close(3.0, derivative));
        assert!(value_close(8.0, pid.compute(data)));
    }

    #[test]
    fn test_level_on_target_gives_no_correction() {
        let mut ctl = AttitudeController::new();
        let out = ctl.feedback(
            &sample(0.0, 0.0, 0.0, [0; 3]),
            &AttitudeSample::default(),
            &EulerAngles::default(),
            &gains(500.0, 500.0),
        );
        assert_eq!(out, Control::default());
    }

    #[test]
    fn test_proportional_axes_map_to_channels() {
        let mut ctl = AttitudeController::new();
        let out = ctl.feedback(
            &sample(0.1, -0.2, 0.3, [0; 3]),
            &AttitudeSample::default(),
            &EulerAngles::default(),
            &gains(1_000.0, 0.0),
        );
        assert_eq!(out.throttle, 0);
        assert_eq!(out.rudder, 100);
        assert_eq!(out.elevator, -200);
        assert_eq!(out.aileron, 300);
    }

    #[test]
    fn test_derivative_uses_rate_relative_to_origin() {
        let mut ctl = AttitudeController::new();
        // x = roll, y = pitch, z = yaw
        let out = ctl.feedback(
            &sample(0.0, 0.0, 0.0, [30_500, 20_500, 10_500]),
            &sample(0.0, 0.0, 0.0, [0, 0, 5_000]),
            &EulerAngles::default(),
            &gains(0.0, 100.0),
        );
        assert_eq!(out.rudder, 5);
        assert_eq!(out.elevator, 20);
        assert_eq!(out.aileron, 30);
    }

    #[test]
    fn test_yaw_and_roll_wrap_but_pitch_does_not() {
        let mut ctl = AttitudeController::new();
        let target = EulerAngles {
            yaw: -3.0,
            pitch: -3.0,
            roll: -3.0,
        };
        // current - target = 6.0 on every axis
        let out = ctl.feedback(
            &sample(3.0, 3.0, 3.0, [0; 3]),
            &AttitudeSample::default(),
            &target,
            &gains(100.0, 0.0),
        );
        let wrapped = ((6.0 - 2.0 * PI) * 100.0) as i32;
        assert_eq!(out.rudder, wrapped);
        assert_eq!(out.aileron, wrapped);
        assert_eq!(out.elevator, 600);
    }

    #[test]
    fn test_gains_are_reloaded_each_call() {
        let mut ctl = AttitudeController::new();
        let s = sample(0.0, 0.5, 0.0, [0; 3]);
        let origin = AttitudeSample::default();
        let target = EulerAngles::default();
        assert_eq!(ctl.feedback(&s, &origin, &target, &gains(100.0, 0.0)).elevator, 50);
        assert_eq!(ctl.feedback(&s, &origin, &target, &gains(10.0, 0.0)).elevator, 5);
    }
}
