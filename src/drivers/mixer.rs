//! Motor mixing and battery-sag compensation.
//!
//! Motor layout, top view:
//!
//! ```text
//!        FRONT
//!   CW  M3  M1  CCW
//!   CCW M0  M2  CW
//!        REAR
//! ```

use crate::config::MOTOR_COUNT;
use crate::drivers::stabilizer::Control;

/// Rows: throttle, rudder (+CW), elevator (+up), aileron (+left).
/// Columns: motors 0..4.
pub const MIXING: [[i32; MOTOR_COUNT]; 4] = [
    [1, 1, 1, 1],
    [1, 1, -1, -1],
    [-1, 1, -1, 1],
    [-1, 1, 1, -1],
];

/// Maps control channels to motor duties clamped to `[0, limit]`.
pub fn mix(control: &Control, limit: i32) -> [u16; MOTOR_COUNT] {
    let limit = limit.max(0);
    let mut duties = [0u16; MOTOR_COUNT];
    for (i, duty) in duties.iter_mut().enumerate() {
        let y = control.throttle * MIXING[0][i]
            + control.rudder * MIXING[1][i]
            + control.elevator * MIXING[2][i]
            + control.aileron * MIXING[3][i];
        *duty = y.clamp(0, limit) as u16;
    }
    duties
}

/// Output scale that keeps thrust roughly independent of battery sag.
/// Zero at or below `shutoff_mv`.
pub fn battery_amplitude(battery_mv: i32, base_mv: i32, shutoff_mv: i32) -> f32 {
    if battery_mv <= shutoff_mv || battery_mv <= 0 {
        return 0.0;
    }
    base_mv as f32 / battery_mv as f32
}

/// Scales every channel by `amp`, truncating toward zero.
pub fn compensate(control: &Control, amp: f32) -> Control {
    let scale = |v: i32| (v as f32 * amp) as i32;
    Control {
        throttle: scale(control.throttle),
        rudder: scale(control.rudder),
        elevator: scale(control.elevator),
        aileron: scale(control.aileron),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BASE_BATTERY_MV, SHUTOFF_BATTERY_MV};
    use crate::test_utils::*;

    fn throttle(t: i32) -> Control {
        Control {
            throttle: t,
            ..Default::default()
        }
    }

    #[test]
    fn test_pure_throttle_is_symmetric() {
        assert_eq!(mix(&throttle(400), 600), [400; 4]);
    }

    #[test]
    fn test_output_clamped_to_limiter() {
        assert_eq!(mix(&throttle(5_000), 600), [600; 4]);
        let wild = Control {
            throttle: 300,
            rudder: 10_000,
            elevator: -10_000,
            aileron: 7,
        };
        for duty in mix(&wild, 600) {
            assert!(duty <= 600);
        }
    }

    #[test]
    fn test_output_never_negative() {
        let c = Control {
            throttle: 100,
            rudder: -500,
            elevator: 0,
            aileron: 0,
        };
        assert_eq!(mix(&c, 600), [0, 0, 600, 600]);
        assert_eq!(mix(&throttle(-50), 600), [0; 4]);
        assert_eq!(mix(&throttle(200), -1), [0; 4]);
    }

    #[test]
    fn test_axis_signs() {
        let c = Control {
            throttle: 300,
            rudder: 0,
            elevator: 10,
            aileron: 0,
        };
        assert_eq!(mix(&c, 1_023), [290, 310, 290, 310]);
        let c = Control {
            throttle: 300,
            rudder: 0,
            elevator: 0,
            aileron: 10,
        };
        assert_eq!(mix(&c, 1_023), [290, 310, 310, 290]);
    }

    #[test]
    fn test_amplitude_is_unity_at_base_voltage() {
        let amp = battery_amplitude(BASE_BATTERY_MV, BASE_BATTERY_MV, SHUTOFF_BATTERY_MV);
        assert!(value_close(1.0, amp));
    }

    #[test]
    fn test_amplitude_is_zero_at_shutoff() {
        assert_eq!(battery_amplitude(SHUTOFF_BATTERY_MV, BASE_BATTERY_MV, SHUTOFF_BATTERY_MV), 0.0);
        assert_eq!(battery_amplitude(1_000, BASE_BATTERY_MV, SHUTOFF_BATTERY_MV), 0.0);
        assert!(battery_amplitude(SHUTOFF_BATTERY_MV + 1, BASE_BATTERY_MV, SHUTOFF_BATTERY_MV) > 1.5);
    }

    #[test]
    fn test_compensation_boosts_sagging_battery() {
        let amp = battery_amplitude(3_500, BASE_BATTERY_MV, SHUTOFF_BATTERY_MV);
        let c = compensate(&throttle(500), amp);
        // 500 * 4200 / 3500 = 600
        assert!((599..=600).contains(&c.throttle));
        assert_eq!(compensate(&throttle(500), 0.0), Control::default());
    }
}
