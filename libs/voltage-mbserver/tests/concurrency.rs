//! Serialization guarantees under concurrent producers

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

mod common;

use std::sync::{Arc, Mutex};

use common::{call, registers, start_engine, words, write_registers_payload, GatedConnection};
use voltage_mbserver::functions::{self, WRITE_HOLDING_REGISTERS};
use voltage_mbserver::{Exception, Frame, RegisterStore, Request, TcpFrame};

const CLIENTS: u16 = 16;
const WRITES_PER_CLIENT: u16 = 25;
const BLOCK: u16 = 50;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writes_equal_sequential_execution() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = start_engine(tmp.path()).await;

    // Record execution order by wrapping the default handler
    let executed: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let log = executed.clone();
    engine.register(WRITE_HOLDING_REGISTERS, move |store, frame| {
        log.lock().unwrap().push(frame.data().to_vec());
        functions::write_holding_registers(store, frame)
    });

    let mut tasks = Vec::new();
    for client in 0..CLIENTS {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            for n in 0..WRITES_PER_CLIENT {
                // Overlapping blocks: every client writes registers 0..BLOCK
                let value = client * 1000 + n;
                let values = vec![value; usize::from(BLOCK)];
                let response = call(&engine, value, 16, write_registers_payload(0, &values)).await;
                assert_eq!(response.data(), words(0, BLOCK).as_slice());
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // Replay in execution order on a private store
    let executed = executed.lock().unwrap().clone();
    assert_eq!(executed.len(), usize::from(CLIENTS * WRITES_PER_CLIENT));
    let mut expected = RegisterStore::new();
    for data in &executed {
        let frame = TcpFrame::new(0, 1, WRITE_HOLDING_REGISTERS, data.clone());
        let (_, exception) = functions::write_holding_registers(&mut expected, &frame);
        assert_eq!(exception, Exception::Success);
    }

    let actual = engine.with_store(|store| store.clone()).await.unwrap();
    assert!(actual == expected);

    // No interleaving: the whole block carries one writer's value
    let block = call(&engine, 1, 3, words(0, BLOCK)).await;
    let values = registers(&block);
    assert!(values.iter().all(|v| *v == values[0]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_requests_execute_in_submission_order() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = start_engine(tmp.path()).await;

    let order: Arc<Mutex<Vec<u16>>> = Arc::new(Mutex::new(Vec::new()));
    let log = order.clone();
    engine.register(66, move |_, frame| {
        let data = frame.data();
        log.lock().unwrap().push(u16::from_be_bytes([data[0], data[1]]));
        (Vec::new(), Exception::Success)
    });

    // Single producer: submission order is arrival order
    let mut gates = Vec::new();
    for id in 0..100u16 {
        let (conn, gate) = GatedConnection::new();
        gate.open(1);
        let request = TcpFrame::new(id, 1, 66, id.to_be_bytes().to_vec());
        engine
            .submit(Request::new(Arc::new(conn), Box::new(request)))
            .await
            .unwrap();
        gates.push(gate);
    }
    for gate in &mut gates {
        gate.responses.recv().await.unwrap();
    }

    let order = order.lock().unwrap().clone();
    assert_eq!(order, (0..100u16).collect::<Vec<_>>());
}
