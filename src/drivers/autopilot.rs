use embassy_time::{Duration, Instant};

use crate::config::DEFAULT_DESCEND_TIME_MS;

/// Low-battery landing failsafe.
///
/// Once entered, throttle is capped at the landing ceiling and cut entirely
/// after the descent window. Only [`AutoPilot::init`] leaves the low-battery
/// state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AutoPilot {
    landing_throttle: i32,
    descend_time: Duration,
    low_battery_since: Option<Instant>,
}

impl Default for AutoPilot {
    fn default() -> Self {
        Self::new(0)
    }
}

impl AutoPilot {
    pub const fn new(landing_throttle: i32) -> Self {
        Self {
            landing_throttle,
            descend_time: Duration::from_millis(DEFAULT_DESCEND_TIME_MS as u64),
            low_battery_since: None,
        }
    }

    pub fn set_landing_throttle(&mut self, throttle: i32) {
        self.landing_throttle = throttle;
    }

    pub fn set_descend_time(&mut self, time: Duration) {
        self.descend_time = time;
    }

    /// Back to normal operation regardless of battery state.
    pub fn init(&mut self) {
        if self.low_battery_since.take().is_some() {
            info!("autopilot: failsafe cleared");
        }
    }

    /// Records the onset of low battery. Later calls keep the first onset.
    pub fn enter_low_battery_mode(&mut self, now: Instant) {
        if self.low_battery_since.is_none() {
            warn!("autopilot: low battery, landing");
            self.low_battery_since = Some(now);
        }
    }

    pub fn is_low_battery(&self) -> bool {
        self.low_battery_since.is_some()
    }

    /// Throttle after the failsafe; never more than `requested`.
    pub fn throttle(&self, now: Instant, requested: i32) -> i32 {
        let Some(since) = self.low_battery_since else {
            return requested;
        };
        if now.saturating_duration_since(since) >= self.descend_time {
            return 0;
        }
        requested.min(self.landing_throttle)
    }
}
