//! Caller-facing connection events.

use crate::error::ClientError;

/// Signals delivered to the caller over the event channel.
///
/// Events arrive in the order the connection observed them; inbound
/// messages are forwarded in extraction order, with a whole read resolved
/// before the next one is processed.
#[derive(Debug)]
pub enum ConnectionEvent<E> {
    /// The TLS session is established. `peer_verified` reports whether the
    /// peer certificate was validated during the handshake; when
    /// verification is disabled the session proceeds regardless and this
    /// flag is the only trace of it.
    SecureConnect {
        /// Outcome of peer certificate validation.
        peer_verified: bool,
    },
    /// First keepalive acknowledgment of this session: the peer is alive
    /// and routing messages.
    Open,
    /// A keepalive acknowledgment.
    Ping,
    /// A decoded protocol message.
    Event(E),
    /// No inbound data within the configured idle window. Diagnostic only;
    /// the connection stays up.
    Timeout,
    /// Connection-fatal error. The connection has been destroyed.
    Error(ClientError),
    /// The peer closed the stream. An internal destroy follows so the
    /// keepalive timer can never outlive the socket.
    End,
}
