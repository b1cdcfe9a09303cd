use core::f32::consts::FRAC_PI_2;

use micromath::F32Ext;

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }
}

impl Quaternion {
    fn normalized(self) -> Self {
        let norm = self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z;
        if norm == 0.0 {
            return Self::default();
        }
        let recip_norm = norm.invsqrt();
        Self {
            w: self.w * recip_norm,
            x: self.x * recip_norm,
            y: self.y * recip_norm,
            z: self.z * recip_norm,
        }
    }

    /// Tait-Bryan angles (yaw about z, then pitch about y, then roll about x).
    pub fn euler(&self) -> EulerAngles {
        let (q0, q1, q2, q3) = (self.w, self.x, self.y, self.z);

        let roll = (q0 * q1 + q2 * q3).atan2(0.5 - q1 * q1 - q2 * q2);

        let sinp = 2.0 * (q0 * q2 - q1 * q3);
        let pitch = if sinp.abs() >= 1.0 {
            FRAC_PI_2.copysign(sinp)
        } else {
            sinp.asin()
        };

        let yaw = (q1 * q2 + q0 * q3).atan2(0.5 - q2 * q2 - q3 * q3);

        EulerAngles { yaw, pitch, roll }
    }
}

/// Orientation in radians.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EulerAngles {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

/// Sensor fusion behind an explicit interface so its integration state can
/// be inspected in tests and swapped per board.
pub trait AttitudeFusion {
    /// Back to the level, zero-yaw orientation.
    fn reset(&mut self);

    /// Integrates one sample. `rate_dps` is the de-biased body rate in deg/s,
    /// `accel_g` the body acceleration in g, `dt` the sampling period in s.
    fn update(&mut self, rate_dps: [f32; 3], accel_g: [f32; 3], dt: f32) -> EulerAngles;

    fn quaternion(&self) -> Quaternion;
}

// ── Madgwick ──────────────────────────────────────────────────────────────────

/// Madgwick gradient-descent IMU filter (gyro + accel, no magnetometer).
pub struct Madgwick {
    beta: f32,
    pub q: Quaternion,
}

impl Default for Madgwick {
    fn default() -> Self {
        Self::new()
    }
}

impl Madgwick {
    pub const DEFAULT_BETA: f32 = 0.1;

    pub fn new() -> Self {
        Self::with_beta(Self::DEFAULT_BETA)
    }

    pub fn with_beta(beta: f32) -> Self {
        Self {
            beta,
            q: Quaternion::default(),
        }
    }

    fn step(&mut self, dt: f32, gx: f32, gy: f32, gz: f32, ax: f32, ay: f32, az: f32) {
        let Quaternion { w: q0, x: q1, y: q2, z: q3 } = self.q;

        // Rate of change of quaternion from gyroscope
        let mut q_dot1 = 0.5 * (-q1 * gx - q2 * gy - q3 * gz);
        let mut q_dot2 = 0.5 * (q0 * gx + q2 * gz - q3 * gy);
        let mut q_dot3 = 0.5 * (q0 * gy - q1 * gz + q3 * gx);
        let mut q_dot4 = 0.5 * (q0 * gz + q1 * gy - q2 * gx);

        // Accelerometer feedback only when the measurement is usable
        let a_norm = ax * ax + ay * ay + az * az;
        if a_norm > 0.0 {
            let recip_norm = a_norm.invsqrt();
            let ax = ax * recip_norm;
            let ay = ay * recip_norm;
            let az = az * recip_norm;

            let _2q0 = 2.0 * q0;
            let _2q1 = 2.0 * q1;
            let _2q2 = 2.0 * q2;
            let _2q3 = 2.0 * q3;
            let _4q0 = 4.0 * q0;
            let _4q1 = 4.0 * q1;
            let _4q2 = 4.0 * q2;
            let _8q1 = 8.0 * q1;
            let _8q2 = 8.0 * q2;
            let q0q0 = q0 * q0;
            let q1q1 = q1 * q1;
            let q2q2 = q2 * q2;
            let q3q3 = q3 * q3;

            // Gradient descent corrective step
            let s0 = _4q0 * q2q2 + _2q2 * ax + _4q0 * q1q1 - _2q1 * ay;
            let s1 = _4q1 * q3q3 - _2q3 * ax + 4.0 * q0q0 * q1 - _2q0 * ay - _4q1
                + _8q1 * q1q1
                + _8q1 * q2q2
                + _4q1 * az;
            let s2 = 4.0 * q0q0 * q2 + _2q0 * ax + _4q2 * q3q3 - _2q3 * ay - _4q2
                + _8q2 * q1q1
                + _8q2 * q2q2
                + _4q2 * az;
            let s3 = 4.0 * q1q1 * q3 - _2q1 * ax + 4.0 * q2q2 * q3 - _2q2 * ay;

            let s_norm = s0 * s0 + s1 * s1 + s2 * s2 + s3 * s3;
            if s_norm > 0.0 {
                let recip_norm = s_norm.invsqrt();
                q_dot1 -= self.beta * s0 * recip_norm;
                q_dot2 -= self.beta * s1 * recip_norm;
                q_dot3 -= self.beta * s2 * recip_norm;
                q_dot4 -= self.beta * s3 * recip_norm;
            }
        }

        self.q = Quaternion {
            w: q0 + q_dot1 * dt,
            x: q1 + q_dot2 * dt,
            y: q2 + q_dot3 * dt,
            z: q3 + q_dot4 * dt,
        }
        .normalized();
    }
}

impl AttitudeFusion for Madgwick {
    fn reset(&mut self) {
        self.q = Quaternion::default();
    }

    fn update(&mut self, rate_dps: [f32; 3], accel_g: [f32; 3], dt: f32) -> EulerAngles {
        let [gx, gy, gz] = rate_dps.map(f32::to_radians);
        let [ax, ay, az] = accel_g;
        self.step(dt, gx, gy, gz, ax, ay, az);
        self.q.euler()
    }

    fn quaternion(&self) -> Quaternion {
        self.q
    }
}

// ── Mahony ────────────────────────────────────────────────────────────────────

/// Mahony complementary filter with integral feedback.
pub struct Mahony {
    kp: f32,
    ki: f32,

    // Integral error
    ix: f32,
    iy: f32,
    iz: f32,

    pub q: Quaternion,
}

impl Default for Mahony {
    fn default() -> Self {
        Self::new()
    }
}

impl Mahony {
    pub fn new() -> Self {
        Self {
            kp: 2.0,
            ki: 0.005,
            ix: 0.0,
            iy: 0.0,
            iz: 0.0,
            q: Quaternion::default(),
        }
    }

    fn step(&mut self, dt: f32, gx: f32, gy: f32, gz: f32, ax: f32, ay: f32, az: f32) {
        let Quaternion { w: q0, x: q1, y: q2, z: q3 } = self.q;

        let mut gx = gx;
        let mut gy = gy;
        let mut gz = gz;

        let a_norm = ax * ax + ay * ay + az * az;
        if a_norm > 0.0 {
            let recip_norm = a_norm.invsqrt();
            let ax = ax * recip_norm;
            let ay = ay * recip_norm;
            let az = az * recip_norm;

            // Estimated direction of gravity
            let halfvx = q1 * q3 - q0 * q2;
            let halfvy = q0 * q1 + q2 * q3;
            let halfvz = q0 * q0 - 0.5 + q3 * q3;

            // Error is cross product between estimated and measured direction of gravity
            let halfex = ay * halfvz - az * halfvy;
            let halfey = az * halfvx - ax * halfvz;
            let halfez = ax * halfvy - ay * halfvx;

            if self.ki > 0.0 {
                self.ix += self.ki * halfex * dt;
                self.iy += self.ki * halfey * dt;
                self.iz += self.ki * halfez * dt;
            } else {
                self.ix = 0.0;
                self.iy = 0.0;
                self.iz = 0.0;
            }

            gx += self.kp * halfex + self.ix;
            gy += self.kp * halfey + self.iy;
            gz += self.kp * halfez + self.iz;
        }

        // Integrate rate of change of quaternion
        let gx = gx * (0.5 * dt);
        let gy = gy * (0.5 * dt);
        let gz = gz * (0.5 * dt);

        self.q = Quaternion {
            w: q0 - q1 * gx - q2 * gy - q3 * gz,
            x: q1 + q0 * gx + q2 * gz - q3 * gy,
            y: q2 + q0 * gy - q1 * gz + q3 * gx,
            z: q3 + q0 * gz + q1 * gy - q2 * gx,
        }
        .normalized();
    }
}

impl AttitudeFusion for Mahony {
    fn reset(&mut self) {
        self.ix = 0.0;
        self.iy = 0.0;
        self.iz = 0.0;
        self.q = Quaternion::default();
    }

    fn update(&mut self, rate_dps: [f32; 3], accel_g: [f32; 3], dt: f32) -> EulerAngles {
        let [gx, gy, gz] = rate_dps.map(f32::to_radians);
        let [ax, ay, az] = accel_g;
        self.step(dt, gx, gy, gz, ax, ay, az);
        self.q.euler()
    }

    fn quaternion(&self) -> Quaternion {
        self.q
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 0.005;
    const LEVEL: [f32; 3] = [0.0, 0.0, 1.0];

    fn rolled_gravity(roll: f32) -> [f32; 3] {
        [0.0, roll.sin(), roll.cos()]
    }

    fn run<F: AttitudeFusion>(f: &mut F, rate: [f32; 3], accel: [f32; 3], steps: usize) -> EulerAngles {
        let mut out = EulerAngles::default();
        for _ in 0..steps {
            out = f.update(rate, accel, DT);
        }
        out
    }

    #[test]
    fn test_madgwick_level_and_still_stays_level() {
        let mut f = Madgwick::new();
        let e = run(&mut f, [0.0; 3], LEVEL, 1_000);
        assert!(e.roll.abs() < 1e-3);
        assert!(e.pitch.abs() < 1e-3);
        assert!(e.yaw.abs() < 1e-3);
    }

    #[test]
    fn test_madgwick_converges_to_accelerometer_roll() {
        let mut f = Madgwick::new();
        let e = run(&mut f, [0.0; 3], rolled_gravity(0.3), 4_000);
        assert!((e.roll - 0.3).abs() < 0.05, "roll = {}", e.roll);
        assert!(e.pitch.abs() < 0.05);
    }

    #[test]
    fn test_madgwick_integrates_yaw_rate() {
        let mut f = Madgwick::new();
        // 20 deg/s for 1 s
        let e = run(&mut f, [0.0, 0.0, 20.0], LEVEL, 200);
        assert!((e.yaw - 20f32.to_radians()).abs() < 0.03, "yaw = {}", e.yaw);
    }

    #[test]
    fn test_madgwick_reset() {
        let mut f = Madgwick::new();
        run(&mut f, [0.0, 0.0, 50.0], LEVEL, 100);
        assert!(f.quaternion().z.abs() > 0.01);
        f.reset();
        assert_eq!(f.quaternion(), Quaternion::default());
    }

    #[test]
    fn test_madgwick_ignores_zero_accel() {
        let mut f = Madgwick::new();
        let e = run(&mut f, [0.0; 3], [0.0; 3], 100);
        assert!(e.roll.abs() < 1e-3 && e.pitch.abs() < 1e-3);
    }

    #[test]
    fn test_mahony_converges_to_accelerometer_roll() {
        let mut f = Mahony::new();
        let e = run(&mut f, [0.0; 3], rolled_gravity(-0.3), 2_000);
        assert!((e.roll + 0.3).abs() < 0.05, "roll = {}", e.roll);
    }

    #[test]
    fn test_mahony_reset_clears_integral() {
        let mut f = Mahony::new();
        run(&mut f, [0.0; 3], rolled_gravity(0.5), 100);
        f.reset();
        assert_eq!(f.quaternion(), Quaternion::default());
        let e = run(&mut f, [0.0; 3], LEVEL, 10);
        assert!(e.roll.abs() < 1e-3);
    }

    #[test]
    fn test_euler_of_pure_pitch_rotation() {
        let half = 0.2f32;
        let q = Quaternion {
            w: half.cos(),
            x: 0.0,
            y: half.sin(),
            z: 0.0,
        };
        let e = q.euler();
        assert!((e.pitch - 0.4).abs() < 0.02, "pitch = {}", e.pitch);
        assert!(e.roll.abs() < 0.01);
    }
}
