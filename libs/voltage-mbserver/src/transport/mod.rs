//! Transport adapters
//!
//! Adapters turn raw bytes into [`Request`]s. Each accepted connection or
//! opened port gets its own task that reads one packet at a time, decodes it
//! and submits it to the engine. Reader tasks stop on cancellation but the
//! connection's write side stays alive for as long as submitted requests
//! still hold it, so those requests are answered after a transport closes.

pub(crate) mod tcp;

#[cfg(feature = "serial")]
pub(crate) mod serial;

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::{Connection, Request};
use crate::engine::Engine;
use crate::frame::{FrameKind, MBAP_HEADER_LEN};

/// Largest MBAP length field: 260-byte ADU minus the 6 bytes before unit id
const MAX_MBAP_LENGTH: usize = 254;

/// RTU has no length field; one read is taken as one frame
const RTU_READ_SIZE: usize = 256;

/// `:` + 2 * 255 hex digits + CRLF
const MAX_ASCII_LINE: usize = 513;

/// Splits a byte stream into undecoded packets
pub(crate) struct PacketReader<R> {
    reader: R,
    kind: FrameKind,
    pending: Vec<u8>,
}

impl<R> PacketReader<R>
where
    R: AsyncRead + Unpin,
{
    pub(crate) fn new(reader: R, kind: FrameKind) -> Self {
        Self {
            reader,
            kind,
            pending: Vec::new(),
        }
    }

    /// Next packet, `None` once the peer has closed the stream
    pub(crate) async fn next_packet(&mut self) -> io::Result<Option<Vec<u8>>> {
        match self.kind {
            FrameKind::Tcp => self.next_mbap().await,
            FrameKind::Rtu => self.next_chunk().await,
            FrameKind::Ascii => self.next_line().await,
        }
    }

    async fn next_mbap(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut header = [0u8; MBAP_HEADER_LEN];
        match self.reader.read_exact(&mut header).await {
            Ok(_) => {},
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }

        let length = usize::from(u16::from_be_bytes([header[4], header[5]]));
        if !(2..=MAX_MBAP_LENGTH).contains(&length) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("MBAP length {} out of range", length),
            ));
        }

        // Length counts the unit id already read with the header
        let mut packet = vec![0u8; MBAP_HEADER_LEN - 1 + length];
        packet[..MBAP_HEADER_LEN].copy_from_slice(&header);
        self.reader.read_exact(&mut packet[MBAP_HEADER_LEN..]).await?;
        Ok(Some(packet))
    }

    async fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut buf = [0u8; RTU_READ_SIZE];
        let n = self.reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(buf[..n].to_vec()))
    }

    async fn next_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            if let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
                return Ok(Some(self.pending.drain(..=pos).collect()));
            }
            if self.pending.len() > MAX_ASCII_LINE {
                // Hand the garbage over so decoding rejects it and resyncs
                return Ok(Some(std::mem::take(&mut self.pending)));
            }

            let mut buf = [0u8; RTU_READ_SIZE];
            let n = self.reader.read(&mut buf).await?;
            if n == 0 {
                return Ok(None);
            }
            self.pending.extend_from_slice(&buf[..n]);
        }
    }
}

/// Read, decode and submit requests until EOF, a fatal error or cancellation
///
/// A TCP decode error drops the connection since the stream can no longer be
/// resynchronized; on serial lines the packet is discarded and reading goes on.
pub(crate) async fn serve_connection<R>(
    engine: Engine,
    reader: R,
    conn: Arc<dyn Connection>,
    kind: FrameKind,
    token: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut packets = PacketReader::new(reader, kind);

    loop {
        let packet = tokio::select! {
            _ = token.cancelled() => {
                debug!("Stopped reading from {}", conn.peer());
                break;
            },
            packet = packets.next_packet() => packet,
        };

        let packet = match packet {
            Ok(Some(packet)) => packet,
            Ok(None) => {
                debug!("{} disconnected", conn.peer());
                break;
            },
            Err(e) => {
                warn!("Read from {} failed: {}", conn.peer(), e);
                break;
            },
        };

        let frame = match kind.decode(&packet) {
            Ok(frame) => frame,
            Err(e) if kind == FrameKind::Tcp => {
                warn!("Dropping {}: {}", conn.peer(), e);
                break;
            },
            Err(e) => {
                warn!("Discarding {} packet from {}: {}", kind, conn.peer(), e);
                continue;
            },
        };

        // Outside the select: a request is never half-submitted
        if let Err(e) = engine.submit(Request::new(conn.clone(), frame)).await {
            warn!("Submit from {} failed: {}", conn.peer(), e);
            break;
        }
    }
}
