#![doc(html_root_url = "https://docs.rs/cotwire/latest")]
//! Persistent streaming client for Cursor-on-Target (CoT) messaging.
//!
//! This crate keeps one long-lived TLS connection per TAK peer alive
//! indefinitely: it reassembles `<event>` documents from an arbitrarily
//! chunked inbound byte stream, classifies them (keepalive acknowledgment,
//! version announcement, caller traffic), and pushes outbound messages
//! through a bounded buffer with real backpressure, so a slow peer can
//! never exhaust memory; `flush` tells callers when the wire has caught up.
//!
//! The entry point is [`TakClient`]. The seams are pluggable:
//! [`codec::Codec`] for message semantics and [`transport::Transport`]
//! for the socket.

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod metrics;
pub mod queue;
mod tls;
pub mod transport;

pub use codec::{Classification, Codec, CotEvent, DecodeError, XmlCodec};
pub use config::{ClientConfig, ClientIdentity, Endpoint};
pub use connection::{
    ConnectionEvent,
    KEEPALIVE_INTERVAL,
    Lifecycle,
    TakClient,
    TakClientBuilder,
};
pub use error::ClientError;
pub use frame::{EventSplit, next_event, strip_control};
pub use queue::RingBuffer;
pub use transport::{StreamTransport, Transport};
