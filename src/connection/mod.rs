//! Streaming connection engine.
//!
//! One [`TakClient`] owns one TLS socket, one inbound accumulator, one
//! bounded outbound buffer, and one keepalive timer. Concurrency follows a
//! single-owner discipline: every piece of mutable state lives behind one
//! mutex ([`state::Shared`]) and the per-epoch reader and keepalive tasks
//! are tied to a cancellation token so destroy tears everything down
//! together. There is deliberately no code path that leaves the keepalive
//! timer running on a dead socket.
//!
//! Callers interact through cheap clones of the handle: `write` resolves
//! once messages are queued (never coupled to network latency), `flush`
//! waits for the wire, `destroy` is the sole cancellation primitive.

mod drain;
mod event;
mod inbound;
mod keepalive;
mod state;

use std::sync::{
    Arc,
    Weak,
    atomic::{AtomicBool, Ordering},
};

pub use event::ConnectionEvent;
use log::{error, info};
pub use state::Lifecycle;
use state::Shared;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{Mutex, Notify, mpsc},
    time::Duration,
};
use tokio_util::sync::CancellationToken;

use crate::{
    codec::{Codec, XmlCodec},
    config::{ClientConfig, ClientIdentity, Endpoint},
    error::ClientError,
    metrics,
    tls,
    transport::{StreamTransport, Transport},
};

/// Interval between outbound keepalives. Fixed by the protocol's
/// conventions rather than configurable.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);

/// Handle to one streaming connection.
///
/// Clones share the same connection; dropping the last handle does not
/// destroy it (spawned tasks hold references until destroy or EOF).
///
/// # Examples
///
/// ```no_run
/// use cotwire::{ClientIdentity, ConnectionEvent, TakClient};
///
/// # async fn run() -> Result<(), cotwire::ClientError> {
/// let (client, mut events) = TakClient::builder()
///     .id("conn-1")
///     .url("ssl://tak.example.com:8089")
///     .identity(ClientIdentity::Pem {
///         cert: std::fs::read("client.pem")?,
///         key: std::fs::read("client.key")?,
///     })
///     .connect()
///     .await?;
///
/// while let Some(event) = events.recv().await {
///     if let ConnectionEvent::Event(cot) = event {
///         println!("{}", cot.as_xml());
///     }
/// }
/// client.destroy().await;
/// # Ok(())
/// # }
/// ```
pub struct TakClient<C: Codec = XmlCodec> {
    inner: Arc<Inner<C>>,
}

impl<C: Codec> Clone for TakClient<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Dial information retained for reconnects.
struct DialInfo {
    endpoint: Endpoint,
    connector: native_tls::TlsConnector,
}

struct Inner<C: Codec> {
    id: String,
    type_label: String,
    config: ClientConfig,
    codec: C,
    dial: Option<DialInfo>,
    /// Handle back to this allocation for the tasks spawned out of `&self`
    /// methods (drain passes, reader, keepalive).
    weak: Weak<Self>,
    shared: Mutex<Shared>,
    /// Re-entrancy guard for the drain pass; claimed with a compare-exchange
    /// so at most one drain runs at a time.
    draining: AtomicBool,
    destroyed: AtomicBool,
    open: AtomicBool,
    /// Signalled whenever the drain pops items, releasing writers waiting
    /// on a full buffer.
    space: Notify,
    /// Signalled when the outbound buffer reaches empty, releasing flush
    /// waiters.
    flushed: Notify,
    events: mpsc::Sender<ConnectionEvent<C::Event>>,
}

impl<C: Codec> Inner<C> {
    fn is_destroyed(&self) -> bool { self.destroyed.load(Ordering::Acquire) }

    /// Deliver an event to the caller. A dropped receiver is not an error;
    /// the connection keeps running for the write side.
    async fn emit(&self, event: ConnectionEvent<C::Event>) {
        if self.events.send(event).await.is_err() {
            tracing::debug!(id = %self.id, "event receiver dropped; event discarded");
        }
    }

    /// Record the first keepalive acknowledgment of this session.
    ///
    /// Returns `true` on the not-open → open transition.
    async fn mark_open(&self) -> bool {
        let first = !self.open.swap(true, Ordering::AcqRel);
        if first {
            let mut shared = self.shared.lock().await;
            if shared.lifecycle == Lifecycle::SecureEstablished {
                shared.lifecycle = Lifecycle::Open;
            }
        }
        first
    }

    async fn record_peer_version(&self, version: String) {
        info!("peer announced version: id={}, version={version}", self.id);
        self.shared.lock().await.peer_version = Some(version);
    }

    /// Serialize-free enqueue: push bodies one at a time, waiting for the
    /// pipeline to make room whenever the buffer is full. Returns silently
    /// (dropping the unqueued remainder) once the connection is destroyed.
    async fn enqueue_all(&self, bodies: Vec<String>) {
        for body in bodies {
            let mut body = body;
            loop {
                if self.is_destroyed() {
                    return;
                }
                let result = { self.shared.lock().await.outbound.push(body) };
                match result {
                    Ok(()) => {
                        self.ensure_drain();
                        break;
                    }
                    Err(rejected) => {
                        body = rejected;
                        // Kick the pipeline, then wait for the next pop (or
                        // destroy) before retrying the push.
                        self.ensure_drain();
                        let space = self.space.notified();
                        tokio::pin!(space);
                        space.as_mut().enable();
                        if !self.shared.lock().await.outbound.is_full() {
                            continue;
                        }
                        if self.is_destroyed() {
                            return;
                        }
                        space.await;
                    }
                }
            }
        }
    }

    /// Start a drain pass unless one is already in progress.
    fn ensure_drain(&self) {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            match self.weak.upgrade() {
                Some(inner) => {
                    tokio::spawn(inner.run_drain());
                }
                // The last handle is gone; nothing can observe the drain.
                None => self.draining.store(false, Ordering::Release),
            }
        }
    }

    /// Wait until everything queued has been handed to the transport.
    async fn wait_flushed(&self) -> Result<(), ClientError> {
        loop {
            if self.is_destroyed() {
                return Err(ClientError::DestroyedMidFlush);
            }
            let flushed = self.flushed.notified();
            tokio::pin!(flushed);
            flushed.as_mut().enable();
            {
                let shared = self.shared.lock().await;
                if shared.outbound.is_empty() && !self.draining.load(Ordering::Acquire) {
                    return Ok(());
                }
            }
            flushed.await;
        }
    }

    /// Tear the connection down: cancel the epoch (stopping the reader and
    /// keepalive together), close the transport, release every waiter.
    /// Idempotent; queued-but-unsent messages stay in the buffer but are
    /// lost to the wire.
    async fn destroy(&self) {
        let first = !self.destroyed.swap(true, Ordering::AcqRel);
        self.open.store(false, Ordering::Release);

        let (transport, was_connected) = {
            let mut shared = self.shared.lock().await;
            let was_connected = !matches!(
                shared.lifecycle,
                Lifecycle::NotConnected | Lifecycle::Destroyed
            );
            shared.lifecycle = Lifecycle::Destroyed;
            shared.epoch.cancel();
            (shared.transport.take(), was_connected)
        };
        if let Some(mut transport) = transport {
            if let Err(err) = transport.shutdown().await {
                tracing::debug!(id = %self.id, error = %err, "transport shutdown during destroy");
            }
        }

        if first {
            if was_connected {
                metrics::dec_connections();
            }
            info!("connection destroyed: id={}, type={}", self.id, self.type_label);
        }

        // Wake writers blocked on a full buffer and pending flushes so they
        // can observe the destroyed state.
        self.space.notify_waiters();
        self.flushed.notify_waiters();
    }

    /// Install a write-side transport and start a fresh epoch.
    async fn install_transport(&self, transport: Box<dyn Transport>) -> CancellationToken {
        let token = CancellationToken::new();
        {
            let mut shared = self.shared.lock().await;
            shared.lifecycle = Lifecycle::SecureEstablished;
            shared.transport = Some(transport);
            shared.epoch = token.clone();
        }
        self.destroyed.store(false, Ordering::Release);
        self.open.store(false, Ordering::Release);
        metrics::inc_connections();
        // Anything still queued from a previous epoch starts flowing now.
        self.ensure_drain();
        token
    }

    /// Split a full-duplex stream and bring up the reader and keepalive
    /// tasks for the new epoch.
    async fn install_stream<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let token = self
            .install_transport(Box::new(StreamTransport::new(writer)))
            .await;
        if let Some(inner) = self.weak.upgrade() {
            tokio::spawn(inbound::run(Arc::clone(&inner), reader, token.clone()));
            tokio::spawn(keepalive::run(inner, token));
        }
    }

    /// Dial the configured endpoint and establish a fresh session.
    async fn connect_inner(&self) -> Result<(), ClientError> {
        let Some(dial) = &self.dial else {
            return Err(ClientError::NotConnected);
        };

        // A reconnect un-sticks the destroyed flag as soon as the new dial
        // begins; writes made during the handshake queue up for the fresh
        // transport.
        self.destroyed.store(false, Ordering::Release);
        self.shared.lock().await.lifecycle = Lifecycle::Connecting;
        let stream = match tls::connect(&dial.endpoint, &dial.connector).await {
            Ok(stream) => stream,
            Err(err) => {
                error!(
                    "connect failed: id={}, endpoint={}, error={err}",
                    self.id, dial.endpoint
                );
                self.shared.lock().await.lifecycle = Lifecycle::NotConnected;
                return Err(err);
            }
        };

        self.install_stream(stream).await;
        let peer_verified = self.config.verify_peer;
        info!(
            "secure session established: id={}, type={}, endpoint={}, \
             peer_verified={peer_verified}",
            self.id, self.type_label, dial.endpoint
        );
        self.emit(ConnectionEvent::SecureConnect { peer_verified })
            .await;
        Ok(())
    }
}

impl TakClient {
    /// Start building a client with the default [`XmlCodec`].
    #[must_use]
    pub fn builder() -> TakClientBuilder<XmlCodec> { TakClientBuilder::new() }
}

impl<C: Codec> TakClient<C> {
    /// Queue events for transmission.
    ///
    /// Each event is serialized *before* this call returns, so the caller
    /// may mutate or drop its events immediately afterwards without
    /// changing what goes on the wire. The call resolves once everything
    /// is queued, not once it is sent; when the buffer is full it waits
    /// for the pipeline to make room. After destroy, writes are dropped
    /// silently.
    pub async fn write(&self, events: &[C::Event]) {
        let bodies = events
            .iter()
            .map(|event| self.inner.codec.encode(event))
            .collect();
        self.inner.enqueue_all(bodies).await;
    }

    /// Queue an already-serialized message.
    pub async fn write_xml(&self, xml: &str) {
        self.inner.enqueue_all(vec![xml.to_owned()]).await;
    }

    /// Send a keepalive through the ordinary write path. The periodic
    /// timer uses exactly this, so keepalives are subject to the same
    /// buffering and backpressure as any other message.
    pub async fn ping(&self) {
        let body = self.inner.codec.encode(&self.inner.codec.keepalive());
        self.inner.enqueue_all(vec![body]).await;
    }

    /// Wait until every currently queued message has been handed to the
    /// transport. Resolves immediately when nothing is queued and no drain
    /// is in progress.
    ///
    /// # Errors
    ///
    /// [`ClientError::DestroyedMidFlush`] when the connection is destroyed
    /// before the buffer empties, including `flush` called after destroy.
    /// Callers can rely on the distinction: `Ok` means delivered to the
    /// transport, the error means abandoned.
    pub async fn flush(&self) -> Result<(), ClientError> { self.inner.wait_flushed().await }

    /// Tear the connection down immediately.
    ///
    /// Closes the socket, cancels the keepalive timer, and fails pending
    /// flushes. Queued-but-unsent messages are lost to the wire (they stay
    /// buffered for a later reconnect); callers needing delivery must
    /// [`flush`](Self::flush) first. Idempotent.
    pub async fn destroy(&self) { self.inner.destroy().await; }

    /// Re-establish the session with a fresh handshake, destroying the
    /// current one first when necessary. The outbound buffer is carried
    /// over; the inbound accumulator starts fresh.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotConnected`] when the client was built without an
    /// endpoint, or any dial/handshake failure.
    pub async fn reconnect(&self) -> Result<(), ClientError> {
        if !self.inner.is_destroyed() {
            self.inner.destroy().await;
        }
        self.inner.connect_inner().await
    }

    /// Install an already-established full-duplex stream instead of
    /// dialing. Intended for in-memory transports in tests and for callers
    /// that manage their own TLS; no `SecureConnect` event is emitted.
    pub async fn attach_stream<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.inner.install_stream(stream).await;
    }

    /// Install only a write-side [`Transport`]: no reader, no keepalive.
    /// Intended for scripted transports when exercising the write
    /// pipeline in isolation.
    pub async fn attach_transport<T: Transport>(&self, transport: T) {
        self.inner.install_transport(Box::new(transport)).await;
    }

    /// Diagnostics identifier supplied at construction.
    #[must_use]
    pub fn id(&self) -> &str { &self.inner.id }

    /// Diagnostics type label supplied at construction (defaults to
    /// `ssl`, the only supported transport).
    #[must_use]
    pub fn type_label(&self) -> &str { &self.inner.type_label }

    /// `true` once the peer has acknowledged a keepalive this session.
    #[must_use]
    pub fn is_open(&self) -> bool { self.inner.open.load(Ordering::Acquire) }

    /// `true` after destroy, until a reconnect.
    #[must_use]
    pub fn is_destroyed(&self) -> bool { self.inner.is_destroyed() }

    /// Current lifecycle state.
    pub async fn lifecycle(&self) -> Lifecycle { self.inner.shared.lock().await.lifecycle }

    /// Last version string announced by the peer, if any.
    pub async fn peer_version(&self) -> Option<String> {
        self.inner.shared.lock().await.peer_version.clone()
    }

    /// Number of messages currently queued for transmission.
    pub async fn queued(&self) -> usize { self.inner.shared.lock().await.outbound.len() }
}

/// Builder for [`TakClient`].
///
/// An endpoint plus identity yields a dialing client; without them the
/// client starts detached and a stream must be attached explicitly.
pub struct TakClientBuilder<C: Codec = XmlCodec> {
    id: Option<String>,
    type_label: Option<String>,
    url: Option<String>,
    endpoint: Option<Endpoint>,
    identity: Option<ClientIdentity>,
    ca: Option<Vec<u8>>,
    config: ClientConfig,
    codec: C,
}

impl TakClientBuilder<XmlCodec> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: None,
            type_label: None,
            url: None,
            endpoint: None,
            identity: None,
            ca: None,
            config: ClientConfig::default(),
            codec: XmlCodec,
        }
    }
}

impl Default for TakClientBuilder<XmlCodec> {
    fn default() -> Self { Self::new() }
}

impl<C: Codec> TakClientBuilder<C> {
    /// Diagnostics identifier; never used for protocol correctness.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Diagnostics type label; never used for protocol correctness.
    #[must_use]
    pub fn type_label(mut self, label: impl Into<String>) -> Self {
        self.type_label = Some(label.into());
        self
    }

    /// Endpoint as an `ssl://host:port` URL, validated at build time.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Endpoint as host and port.
    #[must_use]
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Client certificate material.
    #[must_use]
    pub fn identity(mut self, identity: ClientIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Additional PEM root certificate trusted for peer validation.
    #[must_use]
    pub fn ca(mut self, ca_pem: Vec<u8>) -> Self {
        self.ca = Some(ca_pem);
        self
    }

    /// Replace the whole configuration block.
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the codec, keeping everything else.
    #[must_use]
    pub fn codec<D: Codec>(self, codec: D) -> TakClientBuilder<D> {
        TakClientBuilder {
            id: self.id,
            type_label: self.type_label,
            url: self.url,
            endpoint: self.endpoint,
            identity: self.identity,
            ca: self.ca,
            config: self.config,
            codec,
        }
    }

    /// Construct the client without connecting.
    ///
    /// # Errors
    ///
    /// Endpoint parse failures, [`ClientError::MissingIdentity`] when an
    /// endpoint is set without credentials, or TLS connector construction
    /// failures.
    pub fn build(
        self,
    ) -> Result<(TakClient<C>, mpsc::Receiver<ConnectionEvent<C::Event>>), ClientError> {
        let endpoint = match (self.endpoint, self.url) {
            (Some(endpoint), _) => Some(endpoint),
            (None, Some(url)) => Some(Endpoint::parse(&url)?),
            (None, None) => None,
        };

        let dial = match endpoint {
            Some(endpoint) => {
                let identity = self.identity.ok_or(ClientError::MissingIdentity)?;
                let connector = tls::build_connector(
                    &identity,
                    self.ca.as_deref(),
                    self.config.verify_peer,
                )?;
                Some(DialInfo {
                    endpoint,
                    connector,
                })
            }
            None => None,
        };

        let (events_tx, events_rx) = mpsc::channel(self.config.event_capacity.max(1));
        let queue_capacity = self.config.queue_capacity;
        let inner = Arc::new_cyclic(|weak| Inner {
            id: self.id.unwrap_or_else(|| "tak".to_owned()),
            type_label: self.type_label.unwrap_or_else(|| "ssl".to_owned()),
            config: self.config,
            codec: self.codec,
            dial,
            weak: weak.clone(),
            shared: Mutex::new(Shared::new(queue_capacity)),
            draining: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            open: AtomicBool::new(false),
            space: Notify::new(),
            flushed: Notify::new(),
            events: events_tx,
        });
        Ok((TakClient { inner }, events_rx))
    }

    /// Construct the client and dial the endpoint.
    ///
    /// # Errors
    ///
    /// Everything [`build`](Self::build) can return, plus
    /// [`ClientError::NotConnected`] when no endpoint was configured and
    /// any dial or handshake failure.
    pub async fn connect(
        self,
    ) -> Result<(TakClient<C>, mpsc::Receiver<ConnectionEvent<C::Event>>), ClientError> {
        let (client, events) = self.build()?;
        client.inner.connect_inner().await?;
        Ok((client, events))
    }
}
