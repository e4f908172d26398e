//! Modbus ASCII frame
//!
//! ```text
//! ':' hex([address][fc][data...][lrc]) '\r' '\n'
//! ```
//! Hex digits are emitted uppercase and accepted in either case.

use errors::{frame_error, SlaveError};

use super::{Frame, EXCEPTION_FLAG};
use crate::exception::Exception;
use crate::Result;

const START: u8 = b':';
const END: &[u8] = b"\r\n";

/// Address, function code and LRC once hex-decoded
const MIN_BODY_LEN: usize = 3;

/// Longitudinal redundancy check: two's complement of the byte sum
pub fn lrc(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |sum, byte| sum.wrapping_add(*byte))
        .wrapping_neg()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsciiFrame {
    pub address: u8,
    pub function: u8,
    pub data: Vec<u8>,
}

impl AsciiFrame {
    pub fn new(address: u8, function: u8, data: Vec<u8>) -> Self {
        Self {
            address,
            function,
            data,
        }
    }

    /// Parse one `:`-delimited line including the trailing CRLF
    pub fn decode(packet: &[u8]) -> Result<Self> {
        let hex = packet
            .strip_prefix(&[START])
            .and_then(|rest| rest.strip_suffix(END))
            .ok_or_else(|| frame_error!("ascii frame must start with ':' and end with CRLF"))?;

        let body = decode_hex(hex)?;
        if body.len() < MIN_BODY_LEN {
            return Err(SlaveError::FrameTooShort {
                kind: "ascii",
                min: MIN_BODY_LEN,
                actual: body.len(),
            });
        }

        let (payload, checksum) = body.split_at(body.len() - 1);
        let expected = lrc(payload);
        if checksum[0] != expected {
            return Err(SlaveError::LrcMismatch {
                expected,
                received: checksum[0],
            });
        }

        Ok(Self {
            address: payload[0],
            function: payload[1],
            data: payload[2..].to_vec(),
        })
    }
}

impl Frame for AsciiFrame {
    fn function(&self) -> u8 {
        self.function
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn copy_frame(&self) -> Box<dyn Frame> {
        Box::new(self.clone())
    }

    fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    fn set_exception(&mut self, exception: Exception) {
        self.function |= EXCEPTION_FLAG;
        self.data = vec![exception.code()];
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(self.data.len() + MIN_BODY_LEN);
        body.push(self.address);
        body.push(self.function);
        body.extend_from_slice(&self.data);
        body.push(lrc(&body));

        let mut bytes = Vec::with_capacity(body.len() * 2 + 3);
        bytes.push(START);
        for byte in body {
            bytes.push(HEX_DIGITS[usize::from(byte >> 4)]);
            bytes.push(HEX_DIGITS[usize::from(byte & 0x0F)]);
        }
        bytes.extend_from_slice(END);
        bytes
    }
}

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

fn decode_hex(hex: &[u8]) -> Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(frame_error!("odd number of hex digits ({})", hex.len()));
    }
    hex.chunks_exact(2)
        .map(|pair| -> Result<u8> { Ok((nibble(pair[0])? << 4) | nibble(pair[1])?) })
        .collect()
}

fn nibble(digit: u8) -> Result<u8> {
    match digit {
        b'0'..=b'9' => Ok(digit - b'0'),
        b'A'..=b'F' => Ok(digit - b'A' + 10),
        b'a'..=b'f' => Ok(digit - b'a' + 10),
        _ => Err(frame_error!("invalid hex digit {:?}", char::from(digit))),
    }
}
