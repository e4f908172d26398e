//! Transports over real sockets and in-memory streams

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{start_engine, words, GatedConnection};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use voltage_mbserver::{AsciiFrame, Exception, Frame, FrameKind, Request, RtuFrame, TcpFrame};

async fn read_tcp_response(stream: &mut TcpStream) -> TcpFrame {
    let mut header = [0u8; 6];
    stream.read_exact(&mut header).await.unwrap();
    let len = usize::from(u16::from_be_bytes([header[4], header[5]]));
    let mut rest = vec![0u8; len];
    stream.read_exact(&mut rest).await.unwrap();
    let mut packet = header.to_vec();
    packet.extend_from_slice(&rest);
    TcpFrame::decode(&packet).unwrap()
}

#[tokio::test]
async fn test_tcp_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = start_engine(tmp.path()).await;
    let addr = engine.listen_tcp("127.0.0.1:0").await.unwrap();

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(&TcpFrame::new(0x0101, 9, 6, words(100, 1234)).to_bytes())
        .await
        .unwrap();
    let response = read_tcp_response(&mut client).await;
    assert_eq!(response.transaction_id, 0x0101);
    assert_eq!(response.unit_id, 9);
    assert_eq!(response.data(), words(100, 1234).as_slice());

    client
        .write_all(&TcpFrame::new(0x0102, 9, 3, words(100, 1)).to_bytes())
        .await
        .unwrap();
    let response = read_tcp_response(&mut client).await;
    assert_eq!(response.data(), &[0x02, 0x04, 0xD2]);
}

#[tokio::test]
async fn test_tcp_pipelined_requests_answered_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = start_engine(tmp.path()).await;
    let addr = engine.listen_tcp("127.0.0.1:0").await.unwrap();

    let mut client = TcpStream::connect(addr).await.unwrap();
    let mut burst = Vec::new();
    for tid in 1..=5u16 {
        burst.extend(TcpFrame::new(tid, 1, 6, words(tid, tid * 10)).to_bytes());
    }
    client.write_all(&burst).await.unwrap();

    for tid in 1..=5u16 {
        let response = read_tcp_response(&mut client).await;
        assert_eq!(response.transaction_id, tid);
    }
    let values = engine
        .with_store(|store| store.holding_registers()[1..=5].to_vec())
        .await
        .unwrap();
    assert_eq!(values, vec![10, 20, 30, 40, 50]);
}

#[tokio::test]
async fn test_tcp_exception_response() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = start_engine(tmp.path()).await;
    let addr = engine.listen_tcp("127.0.0.1:0").await.unwrap();

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(&TcpFrame::new(4, 1, 3, words(0xFFFF, 2)).to_bytes())
        .await
        .unwrap();
    let response = read_tcp_response(&mut client).await;
    assert_eq!(response.function(), 0x83);
    assert_eq!(response.data(), &[Exception::IllegalDataAddress.code()]);
}

#[tokio::test]
async fn test_tcp_bad_protocol_id_drops_connection() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = start_engine(tmp.path()).await;
    let addr = engine.listen_tcp("127.0.0.1:0").await.unwrap();

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(&[0x00, 0x01, 0x00, 0x07, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01])
        .await
        .unwrap();

    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(Duration::from_secs(5), client.read(&mut buf))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_bind_conflict_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = start_engine(tmp.path()).await;
    let addr = engine.listen_tcp("127.0.0.1:0").await.unwrap();

    let err = engine.listen_tcp(&addr.to_string()).await.unwrap_err();
    assert_eq!(err.error_code(), "BIND_FAILED");
    assert_eq!(engine.transports().len(), 1);
}

#[tokio::test]
async fn test_close_stops_listeners_but_not_queued_requests() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = start_engine(tmp.path()).await;
    let first = engine.listen_tcp("127.0.0.1:0").await.unwrap();
    let second = engine.listen_tcp("127.0.0.1:0").await.unwrap();
    assert_eq!(engine.transports().len(), 2);

    // Stall the serializer on a write, then queue more work behind it
    let (stalled, mut stalled_gate) = GatedConnection::new();
    engine
        .submit(Request::new(
            Arc::new(stalled),
            Box::new(TcpFrame::new(1, 1, 6, words(7, 70))),
        ))
        .await
        .unwrap();
    stalled_gate.started.recv().await.unwrap();

    let (queued, mut queued_gate) = GatedConnection::new();
    queued_gate.open(1);
    engine
        .submit(Request::new(
            Arc::new(queued),
            Box::new(TcpFrame::new(2, 1, 6, words(8, 80))),
        ))
        .await
        .unwrap();

    let failed = engine.close().await;
    assert!(failed.is_empty());
    assert!(engine.transports().is_empty());
    assert!(TcpStream::connect(first).await.is_err());
    assert!(TcpStream::connect(second).await.is_err());

    stalled_gate.open(1);
    stalled_gate.responses.recv().await.unwrap();
    let response = TcpFrame::decode(&queued_gate.responses.recv().await.unwrap()).unwrap();
    assert_eq!(response.transaction_id, 2);

    let values = engine
        .with_store(|store| (store.holding_registers()[7], store.holding_registers()[8]))
        .await
        .unwrap();
    assert_eq!(values, (70, 80));
}

#[tokio::test]
async fn test_rtu_stream() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = start_engine(tmp.path()).await;
    let (mut client, server) = tokio::io::duplex(512);
    engine.serve_stream(server, "rtu-line", FrameKind::Rtu);
    assert_eq!(engine.transports().labels(), vec!["rtu-line"]);

    client
        .write_all(&RtuFrame::new(0x11, 5, words(3, 0xFF00)).to_bytes())
        .await
        .unwrap();
    let mut buf = [0u8; 64];
    let n = client.read(&mut buf).await.unwrap();
    let response = RtuFrame::decode(&buf[..n]).unwrap();
    assert_eq!(response.address, 0x11);
    assert_eq!(response.data(), words(3, 0xFF00).as_slice());

    let coil = engine.with_store(|store| store.coils()[3]).await.unwrap();
    assert_eq!(coil, 1);
}

#[tokio::test]
async fn test_rtu_bad_crc_is_discarded() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = start_engine(tmp.path()).await;
    let (mut client, server) = tokio::io::duplex(512);
    engine.serve_stream(server, "rtu-line", FrameKind::Rtu);

    client
        .write_all(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00])
        .await
        .unwrap();
    // Line noise does not end the session; the next frame is still answered
    tokio::time::sleep(Duration::from_millis(20)).await;
    client
        .write_all(&RtuFrame::new(0x01, 4, words(0, 1)).to_bytes())
        .await
        .unwrap();

    let mut buf = [0u8; 64];
    let n = client.read(&mut buf).await.unwrap();
    let response = RtuFrame::decode(&buf[..n]).unwrap();
    assert_eq!(response.function(), 4);
    assert_eq!(response.data(), &[0x02, 0x00, 0x00]);
}

#[tokio::test]
async fn test_ascii_stream() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = start_engine(tmp.path()).await;
    let (mut client, server) = tokio::io::duplex(512);
    engine.serve_stream(server, "ascii-line", FrameKind::Ascii);

    client
        .write_all(&AsciiFrame::new(0x02, 6, words(40, 0x1234)).to_bytes())
        .await
        .unwrap();
    let mut buf = [0u8; 64];
    let n = client.read(&mut buf).await.unwrap();
    let response = AsciiFrame::decode(&buf[..n]).unwrap();
    assert_eq!(response.address, 0x02);
    assert_eq!(response.data(), words(40, 0x1234).as_slice());

    // Close stops the stream transport
    assert!(engine.close().await.is_empty());
    assert!(engine.transports().is_empty());
}

#[tokio::test]
async fn test_stalled_client_is_disconnected_after_partial_response() {
    let tmp = tempfile::tempdir().unwrap();
    let config = voltage_mbserver::EngineConfig {
        write_timeout_ms: 50,
        ..Default::default()
    };
    let engine = voltage_mbserver::Engine::start(
        config,
        voltage_mbserver::CheckpointManager::new(tmp.path().join("modbus.state")),
    )
    .await
    .unwrap();

    // Room for 8 of the 11 response bytes; nothing is read until both requests ran
    let (mut client, server) = tokio::io::duplex(8);
    let conn: Arc<dyn voltage_mbserver::Connection> =
        Arc::new(voltage_mbserver::StreamConnection::new("stalled", server));
    for transaction_id in 1..=2 {
        let request = TcpFrame::new(transaction_id, 1, 3, words(0, 1));
        engine
            .submit(Request::new(conn.clone(), Box::new(request)))
            .await
            .unwrap();
    }
    // Queued behind both requests, so they have been served once this returns
    engine.with_store(|_| ()).await.unwrap();

    // The truncated frame is followed by EOF, never by a second header
    let mut received = Vec::new();
    tokio::time::timeout(Duration::from_secs(2), client.read_to_end(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x05, 0x01, 0x03]);

    // Other clients are unaffected
    let response = common::call(&engine, 3, 3, words(0, 1)).await;
    assert_eq!(response.data(), &[0x02, 0x00, 0x00]);
}
