//! Transport frames
//!
//! A [`Frame`] is one decoded protocol message. The serializer only needs the
//! function code and payload of a request, plus a response template built
//! from it (`copy_frame`) that keeps the transport header fields (transaction
//! id, unit/slave address) and recomputes length or checksum on `to_bytes`.

mod ascii;
mod rtu;
mod tcp;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::exception::Exception;
use crate::Result;

pub use ascii::{lrc, AsciiFrame};
pub use rtu::{crc16, RtuFrame};
pub use tcp::{TcpFrame, MBAP_HEADER_LEN};

/// Set on the function code of an exception response
pub const EXCEPTION_FLAG: u8 = 0x80;

/// One encoded protocol message for a specific transport
pub trait Frame: Send + Sync + fmt::Debug {
    /// Function code
    fn function(&self) -> u8;

    /// Payload following the function code
    fn data(&self) -> &[u8];

    /// Response template carrying this frame's header fields forward
    fn copy_frame(&self) -> Box<dyn Frame>;

    fn set_data(&mut self, data: Vec<u8>);

    /// Flag the function code and replace the payload with the exception code
    fn set_exception(&mut self, exception: Exception);

    /// Wire representation
    fn to_bytes(&self) -> Vec<u8>;
}

/// Wire framing of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Tcp,
    Rtu,
    Ascii,
}

impl FrameKind {
    /// Decode one complete frame of this kind
    pub fn decode(self, packet: &[u8]) -> Result<Box<dyn Frame>> {
        Ok(match self {
            Self::Tcp => Box::new(TcpFrame::decode(packet)?),
            Self::Rtu => Box::new(RtuFrame::decode(packet)?),
            Self::Ascii => Box::new(AsciiFrame::decode(packet)?),
        })
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tcp => "tcp",
            Self::Rtu => "rtu",
            Self::Ascii => "ascii",
        };
        f.write_str(name)
    }
}
