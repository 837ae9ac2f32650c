//! Connection lifecycle state and the mutex-guarded shared interior.

use tokio_util::sync::CancellationToken;

use crate::{queue::RingBuffer, transport::Transport};

/// Lifecycle of a streaming connection.
///
/// `Destroyed` is sticky until an explicit reconnect; every other state is
/// transient. `Open` means the peer acknowledged a keepalive and is
/// routing traffic, which is strictly stronger than a completed TLS
/// handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed, never connected.
    NotConnected,
    /// TCP + TLS handshake in progress.
    Connecting,
    /// TLS session up, keepalive running, no acknowledgment yet.
    SecureEstablished,
    /// Peer acknowledged a keepalive; normal operation.
    Open,
    /// Peer closed the stream.
    Ended,
    /// Torn down: socket closed, keepalive cancelled.
    Destroyed,
}

/// Mutable state guarded by the connection's single mutex.
///
/// At most one logical task touches this between suspension points; the
/// mutex reproduces the single-threaded reactor discipline the protocol
/// engine assumes. The outbound buffer and the transport are exclusively
/// owned here; nothing outside the connection may reach them.
pub(super) struct Shared {
    pub(super) lifecycle: Lifecycle,
    /// Pending serialized messages. Survives destroy and reconnect; items
    /// queued at destroy time are lost to the wire, not from the buffer.
    pub(super) outbound: RingBuffer<String>,
    /// Write side of the socket. Taken by an active drain pass and
    /// restored afterwards; `None` while disconnected or mid-drain.
    pub(super) transport: Option<Box<dyn Transport>>,
    /// Cancellation token for the current connection epoch. Replaced on
    /// every (re)connect; cancelling it stops the reader and keepalive
    /// tasks spawned for that epoch together.
    pub(super) epoch: CancellationToken,
    /// Last version string announced by the peer.
    pub(super) peer_version: Option<String>,
}

impl Shared {
    pub(super) fn new(queue_capacity: usize) -> Self {
        Self {
            lifecycle: Lifecycle::NotConnected,
            outbound: RingBuffer::new(queue_capacity.max(1)),
            transport: None,
            epoch: CancellationToken::new(),
            peer_version: None,
        }
    }
}
