//! Command server: applies register protocol datagrams to the bank and
//! tracks link liveness for the disarm failsafe.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Duration, Instant};
use heapless::Vec;

use crate::drivers::protocol::{self, Request, Response};
use crate::error::ProtocolError;
use crate::state::{RegisterBank, N_REGISTERS};

/// Time of the last valid datagram, shared between the transport and the
/// control loop. The timeout belongs to the reader.
pub struct LinkMonitor {
    last: Mutex<CriticalSectionRawMutex, Cell<Instant>>,
}

impl Default for LinkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkMonitor {
    /// The link counts as silent since boot until the first datagram.
    pub const fn new() -> Self {
        Self {
            last: Mutex::new(Cell::new(Instant::from_ticks(0))),
        }
    }

    pub fn touch(&self, now: Instant) {
        self.last.lock(|last| last.set(now));
    }

    pub fn last(&self) -> Instant {
        self.last.lock(|last| last.get())
    }

    /// True once strictly more than `timeout` has passed.
    pub fn timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last()) > timeout
    }
}

/// One datagram in, at most one datagram out. Implementations must not block.
pub trait DatagramHandler {
    fn handle(&self, now: Instant, datagram: &[u8]) -> Option<Response>;
}

pub struct CommandServer<'a> {
    regs: &'a RegisterBank,
    link: &'a LinkMonitor,
}

impl<'a> CommandServer<'a> {
    pub fn new(regs: &'a RegisterBank, link: &'a LinkMonitor) -> Self {
        Self { regs, link }
    }

    fn execute(&self, request: Request) -> Result<Option<Response>, ProtocolError> {
        match request {
            Request::Read { addr } => Ok(Some(protocol::read_response(self.regs.read(addr)?))),
            Request::Write { addr, value } => {
                self.regs.write(addr, value)?;
                Ok(None)
            }
            Request::BulkRead { addr, count } => {
                let mut values = [0i16; N_REGISTERS];
                let values = values
                    .get_mut(..count)
                    .ok_or(ProtocolError::AddressOutOfRange { addr, count })?;
                self.regs.read_range(addr, values)?;
                protocol::bulk_read_response(addr, values).map(Some)
            }
            Request::BulkWrite { addr, payload } => {
                let mut values: Vec<i16, N_REGISTERS> = Vec::new();
                for v in protocol::decode_values(payload) {
                    values
                        .push(v)
                        .map_err(|_| ProtocolError::AddressOutOfRange {
                            addr,
                            count: payload.len() / 2,
                        })?;
                }
                self.regs.write_range(addr, &values)?;
                Ok(None)
            }
            Request::Echo(data) => protocol::echo_response(data).map(Some),
        }
    }
}

impl DatagramHandler for CommandServer<'_> {
    fn handle(&self, now: Instant, datagram: &[u8]) -> Option<Response> {
        let request = match Request::parse(datagram) {
            Ok(request) => request,
            Err(err) => {
                trace!("datagram dropped: {}", err);
                return None;
            }
        };
        self.link.touch(now);
        match self.execute(request) {
            Ok(response) => response,
            Err(err) => {
                trace!("request failed: {}", err);
                None
            }
        }
    }
}
