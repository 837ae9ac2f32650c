//! Shared fixtures for integration tests.
//!
//! Each integration test crate pulls in the helpers it needs; the rest
//! would otherwise trip dead-code warnings per crate.
#![allow(dead_code)]

use std::{
    io,
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use cotwire::{
    ClientConfig,
    ConnectionEvent,
    CotEvent,
    TakClient,
    transport::Transport,
};
use tokio::sync::{mpsc, watch};

/// Initialise test logging once; repeat calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Scripted transport mirroring the fake sockets used against the real
/// TAK server: records every payload, can hold a send pending to simulate
/// peer backpressure (the chunk is accepted, further writes must wait),
/// and can fail the next send.
pub struct MockTransport {
    sent: Arc<Mutex<Vec<String>>>,
    gate: watch::Receiver<bool>,
    fail_next: Arc<AtomicBool>,
}

/// Test-side controls for a [`MockTransport`].
pub struct MockHandle {
    sent: Arc<Mutex<Vec<String>>>,
    gate: watch::Sender<bool>,
    fail_next: Arc<AtomicBool>,
}

pub fn mock_transport() -> (MockTransport, MockHandle) {
    let (gate_tx, gate_rx) = watch::channel(true);
    let sent = Arc::new(Mutex::new(Vec::new()));
    let fail_next = Arc::new(AtomicBool::new(false));
    (
        MockTransport {
            sent: Arc::clone(&sent),
            gate: gate_rx,
            fail_next: Arc::clone(&fail_next),
        },
        MockHandle {
            sent,
            gate: gate_tx,
            fail_next,
        },
    )
}

impl MockHandle {
    /// Simulate backpressure: sends still accept their payload but stay
    /// pending until [`open_gate`](Self::open_gate).
    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    /// Make the next send fail with a broken-pipe error.
    pub fn fail_next_send(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Raw payload of each transport write, in order.
    pub fn batches(&self) -> Vec<String> {
        self.sent.lock().expect("mock lock").clone()
    }

    /// Individual messages across all writes, in order.
    pub fn messages(&self) -> Vec<String> {
        self.batches()
            .iter()
            .flat_map(|batch| batch.lines())
            .map(str::to_owned)
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write failed"));
        }
        self.sent
            .lock()
            .expect("mock lock")
            .push(String::from_utf8_lossy(payload).into_owned());
        while !*self.gate.borrow_and_update() {
            self.gate
                .changed()
                .await
                .map_err(|_| io::Error::other("gate dropped"))?;
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> io::Result<()> { Ok(()) }
}

/// A client with no endpoint: streams and transports are attached by the
/// test.
pub fn detached_client(
    config: ClientConfig,
) -> (TakClient, mpsc::Receiver<ConnectionEvent<CotEvent>>) {
    TakClient::builder()
        .id("test")
        .config(config)
        .build()
        .expect("detached client construction cannot fail")
}

/// A minimal event with the given type and uid.
pub fn cot(event_type: &str, uid: &str) -> CotEvent {
    CotEvent::from_xml(format!("<event type=\"{event_type}\" uid=\"{uid}\"/>"))
        .expect("literal event is well-formed")
}

/// Let spawned connection tasks (drains, readers) run to quiescence.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Drain everything currently buffered on the event channel.
pub fn drain_events(rx: &mut mpsc::Receiver<ConnectionEvent<CotEvent>>) -> Vec<ConnectionEvent<CotEvent>> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
