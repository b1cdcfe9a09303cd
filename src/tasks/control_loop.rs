//! Fixed-period flight control loop.
//!
//! One tick: battery, failsafe, calibration, attitude, link check, targets,
//! throttle, PD feedback, motor output. Register access is grouped into a
//! few short critical sections; sensor and motor I/O happen outside them.

use embassy_time::{Duration, Instant, Timer};

use crate::config::{
    FlightConfig, ANGLE_REG_PER_RAD, BATTERY_FILTER_WINDOW, MAX_DUTY, MOTOR_COUNT, TEST_MODE_MAGIC,
    TRIM_RAD_PER_LSB,
};
use crate::drivers::ahrs::{AttitudeFusion, EulerAngles};
use crate::drivers::autopilot::AutoPilot;
use crate::drivers::filter::MovingAverage;
use crate::drivers::imu::{AttitudeEstimator, AttitudeSample};
use crate::drivers::mixer::{battery_amplitude, compensate, mix};
use crate::drivers::stabilizer::{AttitudeController, AxisGains, Control, Gains};
use crate::hal::{BatteryGauge, Hal, Indicator};
use crate::state::{batt_status, calibrate, Reg, RegisterBank, RegisterFile};
use crate::tasks::comm::LinkMonitor;

fn to_reg(radians: f32) -> i32 {
    (radians * ANGLE_REG_PER_RAD) as i32
}

fn to_radians(reg: i16) -> f32 {
    reg as f32 / ANGLE_REG_PER_RAD
}

fn gains(r: &RegisterFile) -> Gains {
    let axis = |p: Reg, d: Reg| AxisGains {
        p: r.get(p) as f32,
        d: r.get(d) as f32,
    };
    Gains {
        yaw: axis(Reg::GainYawP, Reg::GainYawD),
        pitch: axis(Reg::GainPitchP, Reg::GainPitchD),
        roll: axis(Reg::GainRollP, Reg::GainRollD),
    }
}

// ── Period keeping ────────────────────────────────────────────────────────────

/// Tick deadlines on a fixed grid. An overrun restarts the grid at the
/// current time instead of firing catch-up ticks.
pub struct LoopTimer {
    period: Duration,
    next: Instant,
}

impl LoopTimer {
    pub fn new(start: Instant, period: Duration) -> Self {
        Self { period, next: start }
    }

    pub fn advance(&mut self, now: Instant) -> Instant {
        self.next += self.period;
        if now > self.next {
            warn!("control loop overrun: {} us late", (now - self.next).as_micros());
            self.next = now;
        }
        self.next
    }
}

// ── Control loop ──────────────────────────────────────────────────────────────

pub struct ControlLoop<F: AttitudeFusion> {
    config: FlightConfig,
    gauge: BatteryGauge,
    battery: MovingAverage<BATTERY_FILTER_WINDOW>,
    autopilot: AutoPilot,
    estimator: AttitudeEstimator<F>,
    controller: AttitudeController,
    /// Reference pose for the rate feedback.
    origin: AttitudeSample,
    /// Latest good IMU sample; kept when a read fails.
    sample: AttitudeSample,
    link_lost: bool,
}

impl<F: AttitudeFusion> ControlLoop<F> {
    pub fn new(config: FlightConfig, gauge: BatteryGauge, fusion: F) -> Self {
        Self {
            config,
            gauge,
            battery: MovingAverage::new(),
            autopilot: AutoPilot::default(),
            estimator: AttitudeEstimator::new(fusion),
            controller: AttitudeController::new(),
            origin: AttitudeSample::default(),
            sample: AttitudeSample::default(),
            link_lost: false,
        }
    }

    pub fn config(&self) -> &FlightConfig {
        &self.config
    }

    pub fn autopilot(&self) -> &AutoPilot {
        &self.autopilot
    }

    pub fn estimator(&self) -> &AttitudeEstimator<F> {
        &self.estimator
    }

    /// Runs one iteration with `now` as the tick time.
    pub fn tick<H: Hal>(&mut self, hal: &mut H, regs: &RegisterBank, link: &LinkMonitor, now: Instant) {
        let battery_mv = self.update_battery(hal, regs, now);
        self.update_calibration(hal, regs);
        self.update_attitude(hal, regs);

        let duties = regs.with(|r| self.control(r, link, now, battery_mv));
        for (motor, duty) in duties.into_iter().enumerate() {
            hal.output_duty(motor, duty);
        }
    }

    /// Samples the battery and feeds the failsafe. Returns the voltage used
    /// for output compensation: filtered once the window is full, raw before.
    fn update_battery<H: Hal>(&mut self, hal: &mut H, regs: &RegisterBank, now: Instant) -> i32 {
        let adc = hal.battery_raw();
        let mv = self.gauge.to_millivolts(adc);
        self.battery.put(mv as f32);
        let filtered = self.battery.get();

        let autopilot = &mut self.autopilot;
        regs.with(|r| {
            r.set_clamped(Reg::BattAd, adc as i32);
            r.set_clamped(Reg::BattVoltage, mv);

            autopilot.set_landing_throttle(r.get(Reg::LandingThrottle) as i32);
            autopilot.set_descend_time(Duration::from_millis(r.get(Reg::DescendTime).max(0) as u64));

            if let Some(filtered) = filtered {
                r.set_clamped(Reg::BattVoltageFiltered, filtered as i32);
                if filtered < r.get(Reg::LowBatteryThreshold) as f32 {
                    r.set(Reg::BattStatus, batt_status::LOW);
                    autopilot.enter_low_battery_mode(now);
                } else {
                    r.set(Reg::BattStatus, batt_status::OK);
                }
            }

            // Idle stick clears the failsafe
            if r.get(Reg::JsThrottle) == 0 {
                autopilot.init();
            }
        });

        filtered.map_or(mv, |f| f as i32)
    }

    fn update_calibration<H: Hal>(&mut self, hal: &mut H, regs: &RegisterBank) {
        let mut state = regs.get(Reg::Calibrate);
        if state == calibrate::REQUESTED {
            self.estimator.start_calibration();
            state = calibrate::IN_PROGRESS;
            regs.set(Reg::Calibrate, state);
            hal.set_indicator(Indicator::Calibrating);
        }
        if state == calibrate::IN_PROGRESS && self.estimator.is_calibrated() {
            regs.set(Reg::Calibrate, calibrate::IDLE);
            hal.set_indicator(Indicator::Ready);
        }
    }

    fn update_attitude<H: Hal>(&mut self, hal: &mut H, regs: &RegisterBank) {
        let sample = match self.estimator.update(hal, self.config.sample_interval()) {
            Ok(sample) => sample,
            Err(err) => {
                warn!("imu read failed: {}", err);
                return;
            }
        };
        self.sample = sample;

        regs.with(|r| {
            r.set_clamped(Reg::YawAngle, to_reg(sample.angles.yaw));
            r.set_clamped(Reg::PitchAngle, to_reg(sample.angles.pitch));
            r.set_clamped(Reg::RollAngle, to_reg(sample.angles.roll));
            let rotation = [Reg::RotationX, Reg::RotationY, Reg::RotationZ];
            for (reg, v) in rotation.into_iter().zip(sample.rotation) {
                r.set_clamped(reg, v);
            }
            let accel = [Reg::AccelX, Reg::AccelY, Reg::AccelZ];
            for (reg, v) in accel.into_iter().zip(sample.accel) {
                r.set_clamped(reg, v);
            }
        });
    }

    fn control(
        &mut self,
        r: &mut RegisterFile,
        link: &LinkMonitor,
        now: Instant,
        battery_mv: i32,
    ) -> [u16; MOTOR_COUNT] {
        if link.timed_out(now, self.config.comm_timeout) {
            if !self.link_lost {
                warn!("link timed out, disarming");
                self.link_lost = true;
            }
            r.set(Reg::Enable, 0);
        } else if self.link_lost {
            info!("link restored");
            self.link_lost = false;
        }

        let target = EulerAngles {
            yaw: to_radians(r.get(Reg::TargetYaw)),
            pitch: r.get(Reg::TrimPitch) as f32 * TRIM_RAD_PER_LSB + to_radians(r.get(Reg::JsPitch)),
            roll: r.get(Reg::TrimRoll) as f32 * TRIM_RAD_PER_LSB + to_radians(r.get(Reg::JsRoll)),
        };
        r.set_clamped(Reg::TargetPitch, to_reg(target.pitch));
        r.set_clamped(Reg::TargetRoll, to_reg(target.roll));

        let requested = r.get(Reg::JsThrottle) as i32;
        let mut ctrl = Control {
            throttle: self.autopilot.throttle(now, requested),
            ..Control::default()
        };
        if requested > 0 {
            let fb = self
                .controller
                .feedback(&self.sample, &self.origin, &target, &gains(r));
            ctrl.rudder += fb.rudder;
            ctrl.elevator += fb.elevator;
            ctrl.aileron += fb.aileron;
        }

        r.set_clamped(Reg::OutYaw, ctrl.rudder);
        r.set_clamped(Reg::OutPitch, ctrl.elevator);
        r.set_clamped(Reg::OutRoll, ctrl.aileron);
        r.set_clamped(Reg::OutThrottle, ctrl.throttle);

        let enabled = r.get(Reg::Enable) != 0;
        if !enabled {
            ctrl = Control::default();
        }

        let mut duties = [0u16; MOTOR_COUNT];
        if r.get(Reg::TestMode) == TEST_MODE_MAGIC {
            // OUT_Mx are inputs in test mode
            if enabled {
                for (motor, duty) in duties.iter_mut().enumerate() {
                    if let Some(reg) = Reg::motor_output(motor) {
                        *duty = r.get(reg).clamp(0, MAX_DUTY as i16) as u16;
                    }
                }
            }
        } else {
            let amp = battery_amplitude(
                battery_mv,
                self.config.base_battery_mv,
                self.config.shutoff_battery_mv,
            );
            let limit = (r.get(Reg::Limiter) as i32).min(MAX_DUTY);
            duties = mix(&compensate(&ctrl, amp), limit);
            for (motor, duty) in duties.iter().enumerate() {
                if let Some(reg) = Reg::motor_output(motor) {
                    r.set_clamped(reg, *duty as i32);
                }
            }
        }

        r.set_u32(Reg::ElapsedL, now.as_millis() as u32);
        duties
    }
}

/// Stores the time spent in one tick, in µs, saturating at the register range.
pub fn record_interval(regs: &RegisterBank, begin: Instant, end: Instant) {
    let spent = end.saturating_duration_since(begin).as_micros();
    regs.set(Reg::CtrlInterval, spent.min(i16::MAX as u64) as i16);
}

/// Drives `control` forever at the configured period.
pub async fn run<H: Hal, F: AttitudeFusion>(
    mut control: ControlLoop<F>,
    mut hal: H,
    regs: &RegisterBank,
    link: &LinkMonitor,
) -> ! {
    info!("control loop: {} us period", control.config().loop_period.as_micros());
    hal.set_indicator(Indicator::Ready);

    let mut timer = LoopTimer::new(Instant::now(), control.config().loop_period);
    loop {
        let begin = Instant::now();
        control.tick(&mut hal, regs, link, begin);
        let end = Instant::now();
        record_interval(regs, begin, end);

        Timer::at(timer.advance(end)).await;
    }
}
