//! Connection handles and requests
//!
//! A [`Connection`] is the write side of whatever a request arrived on. It is
//! shared between the adapter that read the request and the serializer that
//! answers it, so writes take `&self`.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};

use crate::frame::Frame;

#[async_trait]
pub trait Connection: Send + Sync {
    /// Remote endpoint label used in logs
    fn peer(&self) -> &str;

    /// Write one complete response frame
    async fn write(&self, bytes: &[u8]) -> io::Result<()>;

    async fn close(&self) -> io::Result<()>;
}

/// A decoded frame paired with the connection it arrived on
pub struct Request {
    pub conn: Arc<dyn Connection>,
    pub frame: Box<dyn Frame>,
}

impl Request {
    pub fn new(conn: Arc<dyn Connection>, frame: Box<dyn Frame>) -> Self {
        Self { conn, frame }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("peer", &self.conn.peer())
            .field("frame", &self.frame)
            .finish()
    }
}

/// Write half of a byte stream (TCP socket, serial port, in-memory duplex)
///
/// Once closed, every further write fails with `BrokenPipe` without touching
/// the stream.
pub struct StreamConnection<W> {
    peer: String,
    writer: Mutex<W>,
    closed: AtomicBool,
}

impl<W> StreamConnection<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(peer: impl Into<String>, writer: W) -> Self {
        Self {
            peer: peer.into(),
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl<W> Connection for StreamConnection<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn peer(&self) -> &str {
        &self.peer
    }

    async fn write(&self, bytes: &[u8]) -> io::Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "connection closed"));
        }
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await
    }

    async fn close(&self) -> io::Result<()> {
        self.closed.store(true, Ordering::Release);
        self.writer.lock().await.shutdown().await
    }
}

/// In-process connection: each response is delivered to a channel
///
/// Lets an embedding application (or a test) act as a client without a
/// socket. Writes fail with `BrokenPipe` once the receiver is dropped.
pub struct ChannelConnection {
    peer: String,
    responses: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelConnection {
    pub fn new(peer: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (responses, rx) = mpsc::unbounded_channel();
        (
            Self {
                peer: peer.into(),
                responses,
            },
            rx,
        )
    }
}

#[async_trait]
impl Connection for ChannelConnection {
    fn peer(&self) -> &str {
        &self.peer
    }

    async fn write(&self, bytes: &[u8]) -> io::Result<()> {
        self.responses
            .send(bytes.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response receiver dropped"))
    }

    async fn close(&self) -> io::Result<()> {
        Ok(())
    }
}
