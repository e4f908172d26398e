//! Shared helpers for the engine integration tests

#![allow(dead_code)]

use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use voltage_mbserver::{
    ChannelConnection, CheckpointManager, Connection, Engine, EngineConfig, Frame, Request,
    TcpFrame,
};

pub async fn start_engine(dir: &Path) -> Engine {
    Engine::start(
        EngineConfig::default(),
        CheckpointManager::new(dir.join("modbus.state")),
    )
    .await
    .unwrap()
}

/// `[addr][qty]` or `[addr][value]`
pub fn words(a: u16, b: u16) -> Vec<u8> {
    let mut data = a.to_be_bytes().to_vec();
    data.extend_from_slice(&b.to_be_bytes());
    data
}

/// Function 16 payload writing `values` from `addr`
pub fn write_registers_payload(addr: u16, values: &[u16]) -> Vec<u8> {
    let mut data = words(addr, values.len() as u16);
    data.push((values.len() * 2) as u8);
    for value in values {
        data.extend_from_slice(&value.to_be_bytes());
    }
    data
}

/// Submit one TCP frame over an in-process connection and wait for the answer
pub async fn call(engine: &Engine, transaction_id: u16, function: u8, data: Vec<u8>) -> TcpFrame {
    let (conn, mut rx) = ChannelConnection::new(format!("client-{}", transaction_id));
    let request = TcpFrame::new(transaction_id, 1, function, data);
    engine
        .submit(Request::new(Arc::new(conn), Box::new(request)))
        .await
        .unwrap();
    TcpFrame::decode(&rx.recv().await.unwrap()).unwrap()
}

/// Decode the registers of a function 3/4 response
pub fn registers(response: &TcpFrame) -> Vec<u16> {
    response.data()[1..]
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

/// Connection whose writes block until the test opens the gate
///
/// Holding a write keeps the serializer inside its critical section, which
/// lets a test line up requests behind it deterministically.
pub struct GatedConnection {
    gate: Arc<Semaphore>,
    started: mpsc::UnboundedSender<()>,
    responses: mpsc::UnboundedSender<Vec<u8>>,
}

pub struct Gate {
    gate: Arc<Semaphore>,
    pub started: mpsc::UnboundedReceiver<()>,
    pub responses: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Gate {
    /// Let `n` pending writes through
    pub fn open(&self, n: usize) {
        self.gate.add_permits(n);
    }
}

impl GatedConnection {
    pub fn new() -> (Self, Gate) {
        let gate = Arc::new(Semaphore::new(0));
        let (started_tx, started_rx) = mpsc::unbounded_channel();
        let (responses_tx, responses_rx) = mpsc::unbounded_channel();
        (
            Self {
                gate: gate.clone(),
                started: started_tx,
                responses: responses_tx,
            },
            Gate {
                gate,
                started: started_rx,
                responses: responses_rx,
            },
        )
    }
}

#[async_trait]
impl Connection for GatedConnection {
    fn peer(&self) -> &str {
        "gated"
    }

    async fn write(&self, bytes: &[u8]) -> io::Result<()> {
        let _ = self.started.send(());
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "gate closed"))?;
        permit.forget();
        let _ = self.responses.send(bytes.to_vec());
        Ok(())
    }

    async fn close(&self) -> io::Result<()> {
        Ok(())
    }
}
