//! Construction-time configuration for a streaming connection.

use std::time::Duration;

use crate::error::ClientError;

/// Default capacity of the outbound message buffer.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
/// Default number of messages coalesced into one transport write.
pub const DEFAULT_BATCH_SIZE: usize = 64;
/// Default capacity of the caller-facing event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Target host and port of a TAK server.
///
/// Only TLS-backed streaming is supported: any scheme other than `ssl` is
/// rejected at construction time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Build an endpoint from host and port directly.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse an `ssl://host:port` URL.
    ///
    /// # Errors
    ///
    /// [`ClientError::UnsupportedScheme`] for any scheme other than `ssl`,
    /// [`ClientError::InvalidEndpoint`] when host or port are missing or
    /// unparseable.
    ///
    /// # Examples
    ///
    /// ```
    /// use cotwire::config::Endpoint;
    ///
    /// let endpoint = Endpoint::parse("ssl://tak.example.com:8089").expect("valid url");
    /// assert_eq!(endpoint.host(), "tak.example.com");
    /// assert_eq!(endpoint.port(), 8089);
    ///
    /// assert!(Endpoint::parse("tcp://tak.example.com:8089").is_err());
    /// ```
    pub fn parse(url: &str) -> Result<Self, ClientError> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| ClientError::InvalidEndpoint(url.to_owned()))?;
        if scheme != "ssl" {
            return Err(ClientError::UnsupportedScheme(scheme.to_owned()));
        }
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| ClientError::InvalidEndpoint(url.to_owned()))?;
        if host.is_empty() {
            return Err(ClientError::InvalidEndpoint(url.to_owned()));
        }
        let port = port
            .parse()
            .map_err(|_| ClientError::InvalidEndpoint(url.to_owned()))?;
        Ok(Self {
            host: host.to_owned(),
            port,
        })
    }

    /// Server hostname, also used for SNI.
    #[must_use]
    pub fn host(&self) -> &str { &self.host }

    /// Server port.
    #[must_use]
    pub fn port(&self) -> u16 { self.port }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ssl://{}:{}", self.host, self.port)
    }
}

/// Client certificate material presented to the server.
#[derive(Clone)]
pub enum ClientIdentity {
    /// PEM-encoded certificate and PKCS#8 private key.
    Pem {
        /// Certificate chain, PEM.
        cert: Vec<u8>,
        /// Private key, PEM.
        key: Vec<u8>,
    },
    /// A PKCS#12 archive with its passphrase (TAK data packages commonly
    /// ship these).
    Pkcs12 {
        /// DER-encoded archive.
        archive: Vec<u8>,
        /// Archive passphrase; empty string when unencrypted.
        passphrase: String,
    },
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs.
        match self {
            Self::Pem { .. } => f.write_str("ClientIdentity::Pem"),
            Self::Pkcs12 { .. } => f.write_str("ClientIdentity::Pkcs12"),
        }
    }
}

/// Tunables for one connection, all optional with defaults.
///
/// # Examples
///
/// ```
/// use cotwire::config::ClientConfig;
///
/// let config = ClientConfig::default()
///     .queue_capacity(4_096)
///     .batch_size(32)
///     .verify_peer(true);
/// assert_eq!(config.queue_capacity, 4_096);
/// ```
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Outbound buffer capacity; a full buffer makes `write` wait.
    pub queue_capacity: usize,
    /// Messages drained per transport write.
    pub batch_size: usize,
    /// Caller event channel capacity.
    pub event_capacity: usize,
    /// Emit a timeout event when no inbound data arrives within this
    /// window. `None` disables the watchdog.
    pub idle_timeout: Option<Duration>,
    /// Abort the handshake when the peer certificate cannot be validated.
    ///
    /// Defaults to `false`, matching deployed TAK infrastructure where
    /// self-signed server certificates are the norm. This weakens the
    /// trust boundary: an active attacker able to intercept the TCP
    /// connection can present any certificate. Enable verification (and
    /// supply a CA via the builder) wherever the server's chain allows it.
    pub verify_peer: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            idle_timeout: None,
            verify_peer: false,
        }
    }
}

impl ClientConfig {
    /// Set the outbound buffer capacity.
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the per-drain batch size.
    #[must_use]
    pub fn batch_size(mut self, batch: usize) -> Self {
        self.batch_size = batch;
        self
    }

    /// Set the caller event channel capacity.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Enable the inbound idle watchdog.
    #[must_use]
    pub fn idle_timeout(mut self, window: Option<Duration>) -> Self {
        self.idle_timeout = window;
        self
    }

    /// Require peer certificate validation during the handshake.
    #[must_use]
    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.verify_peer = verify;
        self
    }
}
