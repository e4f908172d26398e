//! Modbus TCP frame (MBAP header)
//!
//! ```text
//! [transaction id u16][protocol id u16 = 0][length u16][unit id u8][fc u8][data...]
//! ```
//! `length` counts the unit id, function code and data.

use errors::SlaveError;

use super::{Frame, EXCEPTION_FLAG};
use crate::exception::Exception;
use crate::Result;

/// Transaction id, protocol id, length, unit id
pub const MBAP_HEADER_LEN: usize = 7;

/// Header, function code and at least one payload byte
const MIN_FRAME_LEN: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpFrame {
    pub transaction_id: u16,
    pub protocol_id: u16,
    pub unit_id: u8,
    pub function: u8,
    pub data: Vec<u8>,
}

impl TcpFrame {
    pub fn new(transaction_id: u16, unit_id: u8, function: u8, data: Vec<u8>) -> Self {
        Self {
            transaction_id,
            protocol_id: 0,
            unit_id,
            function,
            data,
        }
    }

    /// Parse a complete MBAP frame
    pub fn decode(packet: &[u8]) -> Result<Self> {
        if packet.len() < MIN_FRAME_LEN {
            return Err(SlaveError::FrameTooShort {
                kind: "tcp",
                min: MIN_FRAME_LEN,
                actual: packet.len(),
            });
        }

        let transaction_id = u16::from_be_bytes([packet[0], packet[1]]);
        let protocol_id = u16::from_be_bytes([packet[2], packet[3]]);
        let length = u16::from_be_bytes([packet[4], packet[5]]);

        if protocol_id != 0 {
            return Err(SlaveError::InvalidProtocolId(protocol_id));
        }

        // Length covers everything after the length field
        let actual = packet.len() - (MBAP_HEADER_LEN - 1);
        if usize::from(length) != actual {
            return Err(SlaveError::LengthMismatch {
                declared: usize::from(length),
                actual,
            });
        }

        Ok(Self {
            transaction_id,
            protocol_id,
            unit_id: packet[6],
            function: packet[7],
            data: packet[8..].to_vec(),
        })
    }

    /// MBAP length field: unit id + function code + payload
    pub fn length(&self) -> u16 {
        // A Modbus ADU never exceeds 260 bytes
        (self.data.len() + 2) as u16
    }
}

impl Frame for TcpFrame {
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
        let mut bytes = Vec::with_capacity(MBAP_HEADER_LEN + 1 + self.data.len());
        bytes.extend_from_slice(&self.transaction_id.to_be_bytes());
        bytes.extend_from_slice(&self.protocol_id.to_be_bytes());
        bytes.extend_from_slice(&self.length().to_be_bytes());
        bytes.push(self.unit_id);
        bytes.push(self.function);
        bytes.extend_from_slice(&self.data);
        bytes
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_decode_read_holding_registers() {
        // tid=0x0001, pid=0, len=6, unit=1, fc=3, addr=100, qty=1
        let packet = [0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x64, 0x00, 0x01];
        let frame = TcpFrame::decode(&packet).unwrap();
        assert_eq!(frame.transaction_id, 1);
        assert_eq!(frame.unit_id, 1);
        assert_eq!(frame.function(), 3);
        assert_eq!(frame.data(), &[0x00, 0x64, 0x00, 0x01]);
        assert_eq!(frame.to_bytes(), packet);
    }

    #[test]
    fn test_decode_rejects_short_packet() {
        let err = TcpFrame::decode(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x01, 0x03]).unwrap_err();
        assert!(matches!(
            err,
            SlaveError::FrameTooShort {
                kind: "tcp",
                min: 9,
                actual: 8
            }
        ));
    }

    #[test]
    fn test_decode_rejects_protocol_id() {
        let packet = [0x00, 0x01, 0x00, 0x01, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        assert!(matches!(
            TcpFrame::decode(&packet),
            Err(SlaveError::InvalidProtocolId(1))
        ));
    }

    #[test]
    fn test_decode_rejects_length_mismatch() {
        let packet = [0x00, 0x01, 0x00, 0x00, 0x00, 0x09, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        assert!(matches!(
            TcpFrame::decode(&packet),
            Err(SlaveError::LengthMismatch {
                declared: 9,
                actual: 6
            })
        ));
    }

    #[test]
    fn test_response_template_keeps_header() {
        let request = TcpFrame::new(0xBEEF, 17, 3, vec![0x00, 0x00, 0x00, 0x01]);
        let mut response = request.copy_frame();
        response.set_data(vec![0x02, 0x04, 0xD2]);

        let bytes = response.to_bytes();
        let decoded = TcpFrame::decode(&bytes).unwrap();
        assert_eq!(decoded.length(), 5);
        assert_eq!(&bytes[0..2], &[0xBE, 0xEF]);
        assert_eq!(&bytes[4..6], &[0x00, 0x05]);
        assert_eq!(bytes[6], 17);
        assert_eq!(&bytes[7..], &[0x03, 0x02, 0x04, 0xD2]);
    }

    #[test]
    fn test_exception_response() {
        let request = TcpFrame::new(7, 1, 99, vec![0x00, 0x00]);
        let mut response = request.copy_frame();
        response.set_data(Vec::new());
        response.set_exception(Exception::IllegalFunction);

        assert_eq!(
            response.to_bytes(),
            vec![0x00, 0x07, 0x00, 0x00, 0x00, 0x03, 0x01, 0xE3, 0x01]
        );
    }
}
