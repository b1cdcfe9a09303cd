// Register access protocol.
//
// Request:  [opcode] [addr] [payload...]
// Values are little-endian i16.
//
//   0x00 read        [0x00, addr]                        -> [0x00, lo, hi]
//   0x01 write       [0x01, addr, lo, hi]                -> (none)
//   0x02 bulk read   [0x02, addr, count]                 -> [0x02, addr, count, (lo, hi) * count]
//   0x03 bulk write  [0x03, addr, count, (lo, hi) * count] -> (none)
//   other            echoed back verbatim

use heapless::Vec;

use crate::error::ProtocolError;
use crate::state::N_REGISTERS;

pub const OP_READ: u8 = 0x00;
pub const OP_WRITE: u8 = 0x01;
pub const OP_BULK_READ: u8 = 0x02;
pub const OP_BULK_WRITE: u8 = 0x03;

/// Largest reply: a bulk read of the whole bank.
pub const MAX_RESPONSE: usize = 256;

pub type Response = Vec<u8, MAX_RESPONSE>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    Read { addr: usize },
    Write { addr: usize, value: i16 },
    BulkRead { addr: usize, count: usize },
    /// `payload` holds exactly `count` little-endian values.
    BulkWrite { addr: usize, payload: &'a [u8] },
    /// Unrecognised opcode; the whole datagram is echoed.
    Echo(&'a [u8]),
}

impl<'a> Request<'a> {
    /// Validates a datagram against the opcode's layout and the bank size.
    /// Nothing is read past what the datagram actually holds.
    pub fn parse(data: &'a [u8]) -> Result<Self, ProtocolError> {
        let (&opcode, &addr) = match data {
            [op, addr, ..] => (op, addr),
            [] => return Err(ProtocolError::Empty),
            [op] => {
                return Err(ProtocolError::Truncated {
                    opcode: *op,
                    needed: 2,
                    got: 1,
                })
            }
        };
        let addr = addr as usize;
        check_range(addr, 1)?;

        let need = |needed: usize| {
            if data.len() < needed {
                Err(ProtocolError::Truncated {
                    opcode,
                    needed,
                    got: data.len(),
                })
            } else {
                Ok(())
            }
        };

        match opcode {
            OP_READ => Ok(Request::Read { addr }),
            OP_WRITE => {
                need(4)?;
                Ok(Request::Write {
                    addr,
                    value: decode_i16(&data[2..4]),
                })
            }
            OP_BULK_READ => {
                need(3)?;
                let count = data[2] as usize;
                check_range(addr, count)?;
                Ok(Request::BulkRead { addr, count })
            }
            OP_BULK_WRITE => {
                need(3)?;
                let count = data[2] as usize;
                need(3 + 2 * count)?;
                check_range(addr, count)?;
                Ok(Request::BulkWrite {
                    addr,
                    payload: &data[3..3 + 2 * count],
                })
            }
            _ => Ok(Request::Echo(data)),
        }
    }
}

fn check_range(addr: usize, count: usize) -> Result<(), ProtocolError> {
    match addr.checked_add(count) {
        Some(end) if addr < N_REGISTERS && end <= N_REGISTERS => Ok(()),
        _ => Err(ProtocolError::AddressOutOfRange { addr, count }),
    }
}

pub fn decode_i16(b: &[u8]) -> i16 {
    i16::from_le_bytes([b[0], b[1]])
}

/// Iterates the little-endian values of a bulk write payload.
pub fn decode_values(payload: &[u8]) -> impl Iterator<Item = i16> + '_ {
    payload.chunks_exact(2).map(decode_i16)
}

pub fn read_response(value: i16) -> Response {
    let mut out = Response::new();
    let [lo, hi] = value.to_le_bytes();
    // Capacity is far above 3 bytes
    let _ = out.extend_from_slice(&[OP_READ, lo, hi]);
    out
}

pub fn bulk_read_response(addr: usize, values: &[i16]) -> Result<Response, ProtocolError> {
    let mut out = Response::new();
    out.extend_from_slice(&[OP_BULK_READ, addr as u8, values.len() as u8])
        .map_err(|_| ProtocolError::ResponseOverflow)?;
    for v in values {
        out.extend_from_slice(&v.to_le_bytes())
            .map_err(|_| ProtocolError::ResponseOverflow)?;
    }
    Ok(out)
}

pub fn echo_response(data: &[u8]) -> Result<Response, ProtocolError> {
    Response::from_slice(data).map_err(|_| ProtocolError::ResponseOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_read() {
        assert_eq!(Request::parse(&[0x00, 5]), Ok(Request::Read { addr: 5 }));
        // Trailing bytes are tolerated
        assert_eq!(Request::parse(&[0x00, 5, 9, 9]), Ok(Request::Read { addr: 5 }));
    }

    #[test]
    fn test_parse_write_little_endian() {
        assert_eq!(
            Request::parse(&[0x01, 2, 0x34, 0x12]),
            Ok(Request::Write { addr: 2, value: 0x1234 })
        );
        assert_eq!(
            Request::parse(&[0x01, 2, 0xFF, 0xFF]),
            Ok(Request::Write { addr: 2, value: -1 })
        );
    }

    #[test]
    fn test_short_requests_are_rejected() {
        assert_eq!(Request::parse(&[]), Err(ProtocolError::Empty));
        assert!(matches!(Request::parse(&[0x00]), Err(ProtocolError::Truncated { .. })));
        assert_eq!(
            Request::parse(&[0x01, 2, 0x34]),
            Err(ProtocolError::Truncated {
                opcode: 0x01,
                needed: 4,
                got: 3
            })
        );
        assert!(matches!(Request::parse(&[0x02, 0]), Err(ProtocolError::Truncated { .. })));
    }

    #[test]
    fn test_bulk_write_count_is_not_trusted() {
        // Claims 3 values but carries 2
        assert_eq!(
            Request::parse(&[0x03, 0, 3, 1, 0, 2, 0]),
            Err(ProtocolError::Truncated {
                opcode: 0x03,
                needed: 9,
                got: 7
            })
        );
    }

    #[test]
    fn test_out_of_range_addresses() {
        let n = N_REGISTERS as u8;
        assert!(matches!(
            Request::parse(&[0x00, n]),
            Err(ProtocolError::AddressOutOfRange { .. })
        ));
        assert!(matches!(
            Request::parse(&[0x02, n - 2, 3]),
            Err(ProtocolError::AddressOutOfRange { .. })
        ));
        assert_eq!(
            Request::parse(&[0x02, n - 2, 2]),
            Ok(Request::BulkRead { addr: N_REGISTERS - 2, count: 2 })
        );
        // Address is checked before the opcode
        assert!(matches!(
            Request::parse(&[0x7F, 200]),
            Err(ProtocolError::AddressOutOfRange { .. })
        ));
    }

    #[test]
    fn test_unknown_opcode_echoes() {
        let data = [0x42, 1, 2, 3];
        assert_eq!(Request::parse(&data), Ok(Request::Echo(&data)));
        assert_eq!(echo_response(&data).unwrap().as_slice(), &data);
    }

    #[test]
    fn test_bulk_payload_decoding() {
        let data = [0x03, 4, 2, 0x10, 0x00, 0xFE, 0xFF];
        let Ok(Request::BulkWrite { addr, payload }) = Request::parse(&data) else {
            panic!("expected bulk write");
        };
        assert_eq!(addr, 4);
        let mut values = decode_values(payload);
        assert_eq!(values.next(), Some(16));
        assert_eq!(values.next(), Some(-2));
        assert_eq!(values.next(), None);
    }

    #[test]
    fn test_response_layouts() {
        assert_eq!(read_response(-2).as_slice(), &[0x00, 0xFE, 0xFF]);
        let r = bulk_read_response(7, &[1, 256]).unwrap();
        assert_eq!(r.as_slice(), &[0x02, 7, 2, 1, 0, 0, 1]);
    }
}
