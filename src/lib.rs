//! Flight core for a small Wi-Fi/USB commanded quadcopter.
//!
//! The core fuses IMU data into an attitude estimate, runs a PD stabilizer
//! against operator setpoints, mixes the result into four motor duties and
//! exposes all of its state through a register bank that a remote station
//! reads and writes with a tiny binary protocol.
//!
//! Board specifics (motor outputs, battery ADC, IMU bus, status LED) are
//! supplied through the [`hal::Hal`] trait.

#![no_std]

// Must stay first so the logging macros are visible to every module below.
mod fmt;

pub mod config;
pub mod drivers;
pub mod error;
pub mod hal;
pub mod state;
pub mod tasks;

pub use error::{HalError, ProtocolError, RegisterError, StorageError};
pub use state::{Reg, RegisterBank};

#[cfg(test)]
mod test_utils;
