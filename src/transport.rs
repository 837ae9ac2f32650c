//! Write-side transport seam for the drain loop.
//!
//! The drain pass talks to the socket through [`Transport`] so tests can
//! substitute scripted fakes for the TLS stream: recording transports,
//! failing transports, and transports that hold a send pending to simulate
//! peer backpressure.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Outbound half of a streaming connection.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Hand the whole payload to the transport.
    ///
    /// The future completes once every byte has been accepted. While the
    /// peer applies backpressure it stays pending; that suspension is the
    /// authoritative stop signal for the drain loop; the loop must never
    /// override it.
    ///
    /// # Errors
    ///
    /// An `io::Error` here is fatal to the connection: the drain destroys
    /// it and surfaces the error to the caller.
    async fn send(&mut self, payload: &[u8]) -> io::Result<()>;

    /// Shut down the write side, flushing anything the transport itself
    /// still buffers.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error; by the time this is called the
    /// connection is already going away, so callers only log it.
    async fn shutdown(&mut self) -> io::Result<()>;
}

/// [`Transport`] over any async byte sink: the TLS write half in
/// production, an in-memory duplex in tests.
pub struct StreamTransport<W> {
    writer: W,
}

impl<W> StreamTransport<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self { Self { writer } }
}

#[async_trait]
impl<W> Transport for StreamTransport<W>
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    async fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        self.writer.write_all(payload).await?;
        self.writer.flush().await
    }

    async fn shutdown(&mut self) -> io::Result<()> { self.writer.shutdown().await }
}
