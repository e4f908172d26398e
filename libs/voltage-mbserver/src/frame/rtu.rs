//! Modbus RTU frame
//!
//! ```text
//! [slave address u8][fc u8][data...][crc16 LE]
//! ```

use errors::SlaveError;

use super::{Frame, EXCEPTION_FLAG};
use crate::exception::Exception;
use crate::Result;

/// Address, function code and CRC
const MIN_FRAME_LEN: usize = 4;

/// Calculate CRC16 checksum (Modbus RTU standard)
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;

    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc >>= 1;
                crc ^= 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtuFrame {
    pub address: u8,
    pub function: u8,
    pub data: Vec<u8>,
}

impl RtuFrame {
    pub fn new(address: u8, function: u8, data: Vec<u8>) -> Self {
        Self {
            address,
            function,
            data,
        }
    }

    /// Parse a complete RTU frame and validate its CRC
    pub fn decode(packet: &[u8]) -> Result<Self> {
        if packet.len() < MIN_FRAME_LEN {
            return Err(SlaveError::FrameTooShort {
                kind: "rtu",
                min: MIN_FRAME_LEN,
                actual: packet.len(),
            });
        }

        let body_len = packet.len() - 2;
        let received = u16::from_le_bytes([packet[body_len], packet[body_len + 1]]);
        let expected = crc16(&packet[..body_len]);
        if received != expected {
            return Err(SlaveError::CrcMismatch { expected, received });
        }

        Ok(Self {
            address: packet[0],
            function: packet[1],
            data: packet[2..body_len].to_vec(),
        })
    }
}

impl Frame for RtuFrame {
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
        let mut bytes = Vec::with_capacity(self.data.len() + MIN_FRAME_LEN);
        bytes.push(self.address);
        bytes.push(self.function);
        bytes.extend_from_slice(&self.data);
        let crc = crc16(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_crc16_calculation() {
        let data = [0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        assert_eq!(crc16(&data), 0x0A84);
        assert_eq!(crc16(&[]), 0xFFFF);
    }

    #[test]
    fn test_encode_appends_crc_little_endian() {
        let frame = RtuFrame::new(0x01, 0x03, vec![0x00, 0x00, 0x00, 0x01]);
        assert_eq!(
            frame.to_bytes(),
            vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0A]
        );
    }

    #[test]
    fn test_decode() {
        let frame = RtuFrame::decode(&[0x11, 0x06, 0x00, 0x01, 0x00, 0x03, 0x9A, 0x9B]).unwrap();
        assert_eq!(frame.address, 0x11);
        assert_eq!(frame.function(), 0x06);
        assert_eq!(frame.data(), &[0x00, 0x01, 0x00, 0x03]);
    }

    #[test]
    fn test_decode_rejects_bad_crc() {
        let err = RtuFrame::decode(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0B]).unwrap_err();
        assert!(matches!(
            err,
            SlaveError::CrcMismatch {
                expected: 0x0A84,
                received: 0x0B84
            }
        ));
    }

    #[test]
    fn test_decode_rejects_short_packet() {
        assert!(matches!(
            RtuFrame::decode(&[0x01, 0x03, 0x84]),
            Err(SlaveError::FrameTooShort { kind: "rtu", .. })
        ));
    }

    #[test]
    fn test_exception_response_keeps_address() {
        let request = RtuFrame::new(0x07, 0x41, vec![]);
        let mut response = request.copy_frame();
        response.set_exception(Exception::IllegalFunction);

        let bytes = response.to_bytes();
        assert_eq!(&bytes[..3], &[0x07, 0xC1, 0x01]);
        let decoded = RtuFrame::decode(&bytes).unwrap();
        assert_eq!(decoded.function, 0xC1);
    }
}
