//! The write pipeline: batched drain passes with backpressure.
//!
//! A drain pass pops up to `batch_size` queued messages, joins them with
//! the record separator, and issues one transport write for the whole
//! batch. The transport accepting bytes slowly (or not at all) is the
//! authoritative backpressure signal: while the write future is pending no
//! further pops happen and the buffer holds its remaining items. A write
//! error is fatal to the connection.

use std::sync::{Arc, atomic::Ordering};

use log::error;

use super::{ConnectionEvent, Inner};
use crate::{codec::Codec, error::ClientError, metrics};

/// Why a drain pass stopped.
enum Exit {
    /// The buffer reached empty.
    Empty,
    /// No transport is installed; everything stays queued until the next
    /// connect attaches one and kicks a fresh drain.
    Stalled,
    /// The connection died: destroyed, cancelled mid-write, or a write
    /// error.
    Dead,
}

impl<C: Codec> Inner<C> {
    /// One scheduled drain execution. Entered only through
    /// [`Inner::ensure_drain`], which guarantees a single pass at a time.
    pub(super) async fn run_drain(self: Arc<Self>) {
        let exit = self.drain_pass().await;
        self.draining.store(false, Ordering::Release);

        match exit {
            Exit::Empty => {
                // Writers may have pushed between the final pop and the
                // guard release; start over rather than signalling early.
                if !self.is_destroyed() && !self.shared.lock().await.outbound.is_empty() {
                    self.ensure_drain();
                } else {
                    self.flushed.notify_waiters();
                }
            }
            Exit::Stalled => {}
            Exit::Dead => self.flushed.notify_waiters(),
        }
    }

    async fn drain_pass(&self) -> Exit {
        loop {
            if self.is_destroyed() {
                return Exit::Dead;
            }

            let (batch, mut transport, token) = {
                let mut shared = self.shared.lock().await;
                if shared.outbound.is_empty() {
                    return Exit::Empty;
                }
                let Some(transport) = shared.transport.take() else {
                    return Exit::Stalled;
                };
                let batch_size = self.config.batch_size.max(1);
                let mut batch = Vec::with_capacity(batch_size.min(shared.outbound.len()));
                while batch.len() < batch_size {
                    match shared.outbound.pop() {
                        Some(body) => batch.push(body),
                        None => break,
                    }
                }
                (batch, transport, shared.epoch.clone())
            };
            // Room just opened up for writers blocked on a full buffer.
            self.space.notify_waiters();

            let mut payload = batch.join("\n");
            payload.push('\n');

            let sent = tokio::select! {
                result = transport.send(payload.as_bytes()) => Some(result),
                () = token.cancelled() => None,
            };
            match sent {
                // Destroyed mid-write: the epoch died, the batch is lost.
                None => return Exit::Dead,
                Some(Ok(())) => {
                    for _ in &batch {
                        metrics::inc_events(metrics::Direction::Outbound);
                    }
                    {
                        let mut shared = self.shared.lock().await;
                        // Hand the transport back unless the epoch ended or
                        // a reconnect installed a fresh one meanwhile.
                        if !token.is_cancelled() && shared.transport.is_none() {
                            shared.transport = Some(transport);
                        }
                    }
                    // Yield between batches so reads and I/O completions run
                    // under sustained throughput instead of recursing into
                    // the next batch synchronously.
                    tokio::task::yield_now().await;
                }
                Some(Err(err)) => {
                    error!("transport write failed: id={}, error={err}", self.id);
                    metrics::inc_errors();
                    self.destroy().await;
                    self.emit(ConnectionEvent::Error(ClientError::Io(err))).await;
                    return Exit::Dead;
                }
            }
        }
    }
}
