//! Session lifecycle over a full-duplex in-memory stream: classification,
//! open transition, version bookkeeping, keepalive cadence, end-of-stream
//! teardown.

mod common;

use std::time::Duration;

use common::{detached_client, drain_events};
use cotwire::{
    ClientConfig,
    ClientError,
    ClientIdentity,
    ConnectionEvent,
    KEEPALIVE_INTERVAL,
    Lifecycle,
    TakClient,
};
use rstest::rstest;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

const DUPLEX_CAPACITY: usize = 64 * 1024;

/// Collect `count` newline-terminated wire messages from the server side.
async fn read_messages(server: &mut DuplexStream, count: usize) -> Vec<String> {
    let mut collected = Vec::new();
    let mut acc = String::new();
    let mut buf = [0u8; 4096];
    while collected.len() < count {
        let n = server.read(&mut buf).await.expect("server read");
        assert!(n > 0, "stream closed while waiting for messages");
        acc.push_str(&String::from_utf8_lossy(&buf[..n]));
        while let Some(at) = acc.find('\n') {
            let line = acc[..at].to_owned();
            acc.drain(..=at);
            if !line.is_empty() {
                collected.push(line);
            }
        }
    }
    collected
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn keepalive_starts_immediately_and_repeats_on_interval() {
    let (client, _events) = detached_client(ClientConfig::default());
    let (client_side, mut server) = tokio::io::duplex(DUPLEX_CAPACITY);
    client.attach_stream(client_side).await;

    let started = tokio::time::Instant::now();
    let first = read_messages(&mut server, 1).await;
    assert!(first[0].contains("type=\"t-x-c-t\""), "initial keepalive");
    assert_eq!(started.elapsed(), Duration::ZERO, "sent without waiting");

    let second = read_messages(&mut server, 1).await;
    assert!(second[0].contains("type=\"t-x-c-t\""), "periodic keepalive");
    assert_eq!(started.elapsed(), KEEPALIVE_INTERVAL, "fixed cadence");

    client.destroy().await;
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn destroy_tears_down_timer_and_socket_together() {
    let (client, _events) = detached_client(ClientConfig::default());
    let (client_side, mut server) = tokio::io::duplex(DUPLEX_CAPACITY);
    client.attach_stream(client_side).await;

    let _initial = read_messages(&mut server, 1).await;
    client.destroy().await;

    // The write side shut down with the epoch: the server observes EOF and
    // no further keepalive can ever arrive.
    let mut buf = [0u8; 256];
    let n = server.read(&mut buf).await.expect("read after destroy");
    assert_eq!(n, 0, "EOF after destroy");
    assert!(client.is_destroyed());
    assert_eq!(client.lifecycle().await, Lifecycle::Destroyed);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn ping_ack_opens_the_session() {
    let (client, mut events) = detached_client(ClientConfig::default());
    let (client_side, mut server) = tokio::io::duplex(DUPLEX_CAPACITY);
    client.attach_stream(client_side).await;
    assert!(!client.is_open(), "not open until the peer acknowledges");

    server
        .write_all(b"<event type=\"t-x-c-t-r\"/>")
        .await
        .expect("server write");

    let first = events.recv().await.expect("event");
    assert!(matches!(first, ConnectionEvent::Open), "open on first ack");
    let second = events.recv().await.expect("event");
    assert!(matches!(second, ConnectionEvent::Ping), "ping signal");
    assert!(client.is_open());
    assert_eq!(client.lifecycle().await, Lifecycle::Open);

    // Later acks only ping; the open transition fires once.
    server
        .write_all(b"<event type=\"t-x-c-t-r\"/>")
        .await
        .expect("server write");
    let third = events.recv().await.expect("event");
    assert!(matches!(third, ConnectionEvent::Ping));

    client.destroy().await;
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn version_announcement_is_recorded_not_forwarded() {
    let (client, mut events) = detached_client(ClientConfig::default());
    let (client_side, mut server) = tokio::io::duplex(DUPLEX_CAPACITY);
    client.attach_stream(client_side).await;

    server
        .write_all(
            b"<event type=\"t-x-takp-v\"><detail><TakControl>\
              <TakServerVersionInfo serverVersion=\"4.10-RELEASE\"/>\
              </TakControl></detail></event>\
              <event type=\"a-f-G-U-C\" uid=\"unit-7\"/>",
        )
        .await
        .expect("server write");

    // Only the ordinary event reaches the caller; the announcement was
    // consumed internally.
    let event = events.recv().await.expect("event");
    match event {
        ConnectionEvent::Event(cot) => assert_eq!(cot.uid(), Some("unit-7")),
        other => panic!("expected forwarded event, got {other:?}"),
    }
    assert_eq!(client.peer_version().await.as_deref(), Some("4.10-RELEASE"));

    client.destroy().await;
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn version_announcement_without_nested_fields_is_forwarded() {
    let (client, mut events) = detached_client(ClientConfig::default());
    let (client_side, mut server) = tokio::io::duplex(DUPLEX_CAPACITY);
    client.attach_stream(client_side).await;

    server
        .write_all(b"<event type=\"t-x-takp-v\"><detail/></event>")
        .await
        .expect("server write");

    let event = events.recv().await.expect("event");
    assert!(matches!(event, ConnectionEvent::Event(_)));
    assert_eq!(client.peer_version().await, None);

    client.destroy().await;
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn a_malformed_message_does_not_block_the_rest_of_the_read() {
    common::init_logging();
    let (client, mut events) = detached_client(ClientConfig::default());
    let (client_side, mut server) = tokio::io::duplex(DUPLEX_CAPACITY);
    client.attach_stream(client_side).await;

    // First event has no type attribute and fails to decode; the second is
    // fine and must still come through.
    server
        .write_all(b"<event></event><event type=\"a-f-G\" uid=\"ok\"/>")
        .await
        .expect("server write");

    let event = events.recv().await.expect("event");
    match event {
        ConnectionEvent::Event(cot) => assert_eq!(cot.uid(), Some("ok")),
        other => panic!("expected forwarded event, got {other:?}"),
    }

    client.destroy().await;
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn events_split_across_reads_are_reassembled() {
    let (client, mut events) = detached_client(ClientConfig::default());
    let (client_side, mut server) = tokio::io::duplex(DUPLEX_CAPACITY);
    client.attach_stream(client_side).await;

    server
        .write_all(b"<event type=\"a-f-G\" ui")
        .await
        .expect("server write");
    server.flush().await.expect("server flush");
    server
        .write_all(b"d=\"frag\"/>")
        .await
        .expect("server write");

    let event = events.recv().await.expect("event");
    match event {
        ConnectionEvent::Event(cot) => assert_eq!(cot.uid(), Some("frag")),
        other => panic!("expected forwarded event, got {other:?}"),
    }

    client.destroy().await;
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn eof_emits_end_and_destroys_internally() {
    let (client, mut events) = detached_client(ClientConfig::default());
    let (client_side, mut server) = tokio::io::duplex(DUPLEX_CAPACITY);
    client.attach_stream(client_side).await;
    let _initial = read_messages(&mut server, 1).await;

    drop(server);

    let event = events.recv().await.expect("event");
    assert!(matches!(event, ConnectionEvent::End), "end surfaced");
    common::settle().await;
    // The internal destroy must follow: no keepalive may outlive the
    // socket.
    assert!(client.is_destroyed());
    assert_eq!(client.lifecycle().await, Lifecycle::Destroyed);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn idle_window_emits_timeout_without_teardown() {
    let config = ClientConfig::default().idle_timeout(Some(Duration::from_secs(1)));
    let (client, mut events) = detached_client(config);
    let (client_side, _server) = tokio::io::duplex(DUPLEX_CAPACITY);
    client.attach_stream(client_side).await;

    let event = events.recv().await.expect("event");
    assert!(matches!(event, ConnectionEvent::Timeout));
    assert!(!client.is_destroyed(), "timeout is diagnostic only");

    client.destroy().await;
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn destroyed_session_emits_no_further_inbound_events() {
    let (client, mut events) = detached_client(ClientConfig::default());
    let (client_side, mut server) = tokio::io::duplex(DUPLEX_CAPACITY);
    client.attach_stream(client_side).await;

    client.destroy().await;
    let _ = server.write_all(b"<event type=\"a-f-G\" uid=\"late\"/>").await;
    common::settle().await;

    let late = drain_events(&mut events)
        .iter()
        .any(|event| matches!(event, ConnectionEvent::Event(_)));
    assert!(!late, "reader stopped with the epoch");
}

#[rstest]
fn non_tls_schemes_are_rejected_at_construction() {
    let result = TakClient::builder()
        .url("tcp://tak.example.com:8089")
        .identity(ClientIdentity::Pem {
            cert: Vec::new(),
            key: Vec::new(),
        })
        .build();
    assert!(matches!(result, Err(ClientError::UnsupportedScheme(scheme)) if scheme == "tcp"));
}

#[rstest]
fn dialing_requires_credentials() {
    let result = TakClient::builder().url("ssl://tak.example.com:8089").build();
    assert!(matches!(result, Err(ClientError::MissingIdentity)));
}

#[rstest]
fn endpoints_without_a_port_are_rejected() {
    let result = TakClient::builder()
        .url("ssl://tak.example.com")
        .identity(ClientIdentity::Pem {
            cert: Vec::new(),
            key: Vec::new(),
        })
        .build();
    assert!(matches!(result, Err(ClientError::InvalidEndpoint(_))));
}
