//! Error taxonomy for the streaming client.

use thiserror::Error;

/// Failures surfaced by connection construction and lifecycle operations.
///
/// Transport errors never trigger an automatic reconnect; reconnection
/// policy belongs to the caller.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The endpoint scheme is not a TLS stream.
    #[error("unsupported scheme `{0}`; only ssl:// endpoints are supported")]
    UnsupportedScheme(String),

    /// The endpoint string could not be parsed into host and port.
    #[error("invalid endpoint `{0}`")]
    InvalidEndpoint(String),

    /// A client certificate and key are required to dial a TAK server.
    #[error("a client certificate and key are required")]
    MissingIdentity,

    /// TLS connector construction or handshake failure.
    #[error("tls failure: {0}")]
    Tls(#[from] native_tls::Error),

    /// Transport-level failure: connect, mid-stream read, or write.
    #[error("transport failure: {0}")]
    Io(#[from] std::io::Error),

    /// An operation required an established transport and none exists.
    #[error("no transport is established")]
    NotConnected,

    /// The connection was destroyed while a flush was still waiting.
    ///
    /// Distinguishes "delivered" from "abandoned": messages queued at
    /// destroy time were lost, not flushed.
    #[error("connection destroyed before the flush completed")]
    DestroyedMidFlush,
}
