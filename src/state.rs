//! Register bank shared between the control loop and the command server.
//!
//! Every quantity the remote station can see or tune lives in one dense array
//! of `i16`, addressed by [`Reg`]. Floating-point quantities are scaled before
//! storage; the scale is part of each register's meaning (see `config`).
//!
//! The bank is the only shared mutable state in the system. All access goes
//! through a critical-section mutex, so a bulk write from the command server
//! is never observed half-applied by the control loop (and vice versa).

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::config::{DEFAULT_DESCEND_TIME_MS, DEFAULT_LIMITER};
use crate::error::RegisterError;

// ── Register IDs ──────────────────────────────────────────────────────────────

/// Register IDs. The operator-writable block comes first; telemetry starts at
/// [`Reg::Calibrate`] so one bulk read from there returns the whole status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Reg {
    /// Arm flag, forced to 0 on link loss.
    Enable = 0,
    /// `0xA5` hands the motors to `OutM0..OutM3`.
    TestMode,
    /// Motor duty ceiling (10-bit).
    Limiter,
    GainYawP,
    GainYawD,
    GainPitchP,
    GainPitchD,
    GainRollP,
    GainRollD,
    /// 0.1 degree.
    TrimPitch,
    /// 0.1 degree.
    TrimRoll,
    /// 0.1 degree.
    TargetYaw,
    /// Operator throttle, 10-bit duty. Zero means disarmed/idle.
    JsThrottle,
    /// 0.1 degree.
    JsPitch,
    /// 0.1 degree.
    JsRoll,
    /// mV.
    LowBatteryThreshold,
    /// Throttle ceiling during the low-battery descent.
    LandingThrottle,
    /// ms from low-battery onset until throttle is cut.
    DescendTime,
    /// 0 idle, 1 requested, 2 in progress.
    Calibrate,
    BattAd,
    /// mV.
    BattVoltage,
    /// mV, moving average.
    BattVoltageFiltered,
    /// 0 unknown, 1 low, 2 ok.
    BattStatus,
    /// 0.1 degree.
    YawAngle,
    PitchAngle,
    RollAngle,
    /// centi-degrees per second.
    RotationX,
    RotationY,
    RotationZ,
    /// milli-g.
    AccelX,
    AccelY,
    AccelZ,
    TargetPitch,
    TargetRoll,
    OutThrottle,
    OutYaw,
    OutPitch,
    OutRoll,
    OutM0,
    OutM1,
    OutM2,
    OutM3,
    /// µs spent in the last control tick.
    CtrlInterval,
    /// ms since boot, low half.
    ElapsedL,
    /// ms since boot, high half.
    ElapsedH,
}

/// Number of registers in the bank.
pub const N_REGISTERS: usize = Reg::ElapsedH as usize + 1;

impl Reg {
    pub const fn id(self) -> usize {
        self as usize
    }

    /// `OutM0 + motor`.
    pub const fn motor_output(motor: usize) -> Option<Self> {
        match motor {
            0 => Some(Self::OutM0),
            1 => Some(Self::OutM1),
            2 => Some(Self::OutM2),
            3 => Some(Self::OutM3),
            _ => None,
        }
    }
}

/// Calibration request states held in [`Reg::Calibrate`].
pub mod calibrate {
    pub const IDLE: i16 = 0;
    pub const REQUESTED: i16 = 1;
    pub const IN_PROGRESS: i16 = 2;
}

/// Battery states held in [`Reg::BattStatus`].
pub mod batt_status {
    pub const UNKNOWN: i16 = 0;
    pub const LOW: i16 = 1;
    pub const OK: i16 = 2;
}

/// The power-on register vector.
pub const fn default_registers() -> [i16; N_REGISTERS] {
    let mut regs = [0i16; N_REGISTERS];
    regs[Reg::Limiter.id()] = DEFAULT_LIMITER;
    regs[Reg::DescendTime.id()] = DEFAULT_DESCEND_TIME_MS;
    regs
}

// ── Bank ──────────────────────────────────────────────────────────────────────

pub struct RegisterBank {
    regs: Mutex<CriticalSectionRawMutex, RefCell<[i16; N_REGISTERS]>>,
}

impl Default for RegisterBank {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterBank {
    /// A bank holding [`default_registers`]. `const` so it can live in a
    /// `static` shared by the control task and the transport.
    pub const fn new() -> Self {
        Self {
            regs: Mutex::new(RefCell::new(default_registers())),
        }
    }

    /// Restores the power-on vector in place.
    pub fn reset(&self) {
        self.regs.lock(|regs| *regs.borrow_mut() = default_registers());
        debug!("register bank reset");
    }

    pub fn get(&self, reg: Reg) -> i16 {
        self.regs.lock(|regs| regs.borrow()[reg.id()])
    }

    pub fn set(&self, reg: Reg, value: i16) {
        self.regs.lock(|regs| regs.borrow_mut()[reg.id()] = value);
    }

    /// Stores `value` in `low` and `low + 1` (little-endian halves) under one lock.
    pub fn set_u32(&self, low: Reg, value: u32) {
        self.regs.lock(|regs| {
            let mut regs = regs.borrow_mut();
            if let Some(pair) = regs.get_mut(low.id()..low.id() + 2) {
                pair[0] = value as u16 as i16;
                pair[1] = (value >> 16) as u16 as i16;
            }
        });
    }

    pub fn get_u32(&self, low: Reg) -> u32 {
        self.regs.lock(|regs| {
            let regs = regs.borrow();
            match regs.get(low.id()..low.id() + 2) {
                Some(pair) => pair[0] as u16 as u32 | (pair[1] as u16 as u32) << 16,
                None => 0,
            }
        })
    }

    /// Reads one register by raw address.
    pub fn read(&self, addr: usize) -> Result<i16, RegisterError> {
        self.regs.lock(|regs| {
            regs.borrow()
                .get(addr)
                .copied()
                .ok_or(RegisterError::OutOfRange { addr, count: 1 })
        })
    }

    /// Writes one register by raw address. Out-of-range writes change nothing.
    pub fn write(&self, addr: usize, value: i16) -> Result<(), RegisterError> {
        self.regs.lock(|regs| {
            let mut regs = regs.borrow_mut();
            let slot = regs
                .get_mut(addr)
                .ok_or(RegisterError::OutOfRange { addr, count: 1 })?;
            *slot = value;
            Ok(())
        })
    }

    /// Copies `out.len()` consecutive registers starting at `addr`.
    pub fn read_range(&self, addr: usize, out: &mut [i16]) -> Result<(), RegisterError> {
        let count = out.len();
        self.regs.lock(|regs| {
            let range = checked_range(addr, count).ok_or(RegisterError::OutOfRange { addr, count })?;
            out.copy_from_slice(&regs.borrow()[range]);
            Ok(())
        })
    }

    /// Writes consecutive registers starting at `addr`. Either the whole range
    /// is written or nothing is.
    pub fn write_range(&self, addr: usize, values: &[i16]) -> Result<(), RegisterError> {
        let count = values.len();
        self.regs.lock(|regs| {
            let range = checked_range(addr, count).ok_or(RegisterError::OutOfRange { addr, count })?;
            regs.borrow_mut()[range].copy_from_slice(values);
            Ok(())
        })
    }

    /// Runs `f` with exclusive access to the whole file, for multi-register
    /// updates that must be observed together.
    pub fn with<R>(&self, f: impl FnOnce(&mut RegisterFile) -> R) -> R {
        self.regs.lock(|regs| {
            let mut regs = regs.borrow_mut();
            f(&mut RegisterFile(&mut *regs))
        })
    }

    pub fn snapshot(&self) -> [i16; N_REGISTERS] {
        self.regs.lock(|regs| *regs.borrow())
    }
}

fn checked_range(addr: usize, count: usize) -> Option<core::ops::Range<usize>> {
    let end = addr.checked_add(count)?;
    (end <= N_REGISTERS).then_some(addr..end)
}

/// Typed view of the locked register array handed out by [`RegisterBank::with`].
pub struct RegisterFile<'a>(&'a mut [i16; N_REGISTERS]);

impl RegisterFile<'_> {
    pub fn get(&self, reg: Reg) -> i16 {
        self.0[reg.id()]
    }

    pub fn set(&mut self, reg: Reg, value: i16) {
        self.0[reg.id()] = value;
    }

    /// Saturating store of a wider integer.
    pub fn set_clamped(&mut self, reg: Reg, value: i32) {
        self.0[reg.id()] = value.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
    }

    pub fn set_u32(&mut self, low: Reg, value: u32) {
        if let Some(pair) = self.0.get_mut(low.id()..low.id() + 2) {
            pair[0] = value as u16 as i16;
            pair[1] = (value >> 16) as u16 as i16;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bank_starts_with_default_vector() {
        let bank = RegisterBank::new();
        assert_eq!(bank.get(Reg::Limiter), DEFAULT_LIMITER);
        assert_eq!(bank.get(Reg::DescendTime), DEFAULT_DESCEND_TIME_MS);
        assert_eq!(bank.get(Reg::Enable), 0);
        assert_eq!(bank.get(Reg::TestMode), 0);
        assert_eq!(bank.snapshot().len(), 45);
    }

    #[test]
    fn test_bank_reset_restores_defaults() {
        let bank = RegisterBank::new();
        bank.set(Reg::Limiter, 100);
        bank.set(Reg::GainRollP, 55);
        bank.reset();
        assert_eq!(bank.snapshot(), default_registers());
    }

    #[test]
    fn test_bank_raw_address_access() {
        let bank = RegisterBank::new();
        bank.write(Reg::GainPitchD.id(), -1234).unwrap();
        assert_eq!(bank.read(Reg::GainPitchD.id()), Ok(-1234));
        assert_eq!(bank.get(Reg::GainPitchD), -1234);
    }

    #[test]
    fn test_bank_rejects_out_of_range_without_change() {
        let bank = RegisterBank::new();
        let before = bank.snapshot();
        assert_eq!(
            bank.write(N_REGISTERS, 1),
            Err(RegisterError::OutOfRange { addr: N_REGISTERS, count: 1 })
        );
        assert!(bank.read(N_REGISTERS).is_err());
        assert!(bank.write_range(N_REGISTERS - 1, &[1, 2]).is_err());
        assert!(bank.write_range(usize::MAX, &[1]).is_err());
        assert_eq!(bank.snapshot(), before);
    }

    #[test]
    fn test_bank_range_round_trip() {
        let bank = RegisterBank::new();
        bank.write_range(Reg::GainYawP.id(), &[1, -2, 3, -4, 5, -6]).unwrap();
        let mut out = [0i16; 6];
        bank.read_range(Reg::GainYawP.id(), &mut out).unwrap();
        assert_eq!(out, [1, -2, 3, -4, 5, -6]);
        assert_eq!(bank.get(Reg::GainRollD), -6);
    }

    #[test]
    fn test_bank_range_touching_last_register() {
        let bank = RegisterBank::new();
        bank.write_range(N_REGISTERS - 2, &[7, 8]).unwrap();
        let mut out = [0i16; 2];
        bank.read_range(N_REGISTERS - 2, &mut out).unwrap();
        assert_eq!(out, [7, 8]);
    }

    #[test]
    fn test_bank_u32_pair() {
        let bank = RegisterBank::new();
        bank.set_u32(Reg::ElapsedL, 0x0012_F00D);
        assert_eq!(bank.get(Reg::ElapsedL), 0xF00Du16 as i16);
        assert_eq!(bank.get(Reg::ElapsedH), 0x0012);
        assert_eq!(bank.get_u32(Reg::ElapsedL), 0x0012_F00D);
    }

    #[test]
    fn test_register_file_saturates() {
        let bank = RegisterBank::new();
        bank.with(|regs| {
            regs.set_clamped(Reg::OutYaw, 100_000);
            regs.set_clamped(Reg::OutRoll, -100_000);
        });
        assert_eq!(bank.get(Reg::OutYaw), i16::MAX);
        assert_eq!(bank.get(Reg::OutRoll), i16::MIN);
    }

    #[test]
    fn test_motor_output_registers_are_consecutive() {
        for motor in 0..4 {
            assert_eq!(
                Reg::motor_output(motor).map(Reg::id),
                Some(Reg::OutM0.id() + motor)
            );
        }
        assert_eq!(Reg::motor_output(4), None);
    }
}
