//! Error types for the flight core (no_std `thiserror` 2).
//!
//! None of these ever abort the control loop: callers degrade (drop a
//! datagram, keep the previous IMU sample, reset a config) instead.

use thiserror::Error;

/// Register bank access errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegisterError {
    #[error("register range {addr}+{count} is outside the bank")]
    OutOfRange { addr: usize, count: usize },
}

/// Command protocol decoding errors. The server turns every one of these into
/// a silently dropped datagram.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    #[error("datagram shorter than opcode + address")]
    Empty,

    #[error("opcode {opcode:#04x} needs {needed} bytes, got {got}")]
    Truncated { opcode: u8, needed: usize, got: usize },

    #[error("register range {addr}+{count} is outside the bank")]
    AddressOutOfRange { addr: usize, count: usize },

    #[error("response does not fit the datagram buffer")]
    ResponseOverflow,
}

impl From<RegisterError> for ProtocolError {
    fn from(err: RegisterError) -> Self {
        match err {
            RegisterError::OutOfRange { addr, count } => Self::AddressOutOfRange { addr, count },
        }
    }
}

/// Persistent configuration errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    #[error("checksum mismatch: stored {stored:#04x}, computed {computed:#04x}")]
    ChecksumMismatch { stored: u8, computed: u8 },

    #[error("string field is not null terminated")]
    Unterminated,

    #[error("string does not fit its field")]
    FieldTooLong,

    #[error("storage backend failure")]
    Backend,
}

/// Board I/O errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HalError {
    #[error("sensor bus transfer failed")]
    Bus,

    #[error("sensor not ready")]
    NotReady,
}
