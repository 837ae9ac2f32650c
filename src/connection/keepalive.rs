//! Periodic keepalive task.

use std::sync::Arc;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::{Inner, KEEPALIVE_INTERVAL};
use crate::codec::Codec;

/// Send keepalives at a fixed cadence until the epoch ends.
///
/// The first tick fires immediately, so the peer sees a keepalive as soon
/// as the secure session is up. Keepalives travel the ordinary write path:
/// buffered, batched, and subject to the same backpressure as every other
/// message, never a privileged side-channel write.
pub(super) async fn run<C: Codec>(inner: Arc<Inner<C>>, token: CancellationToken) {
    let mut interval = time::interval(KEEPALIVE_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = token.cancelled() => return,
            _ = interval.tick() => {}
        }
        if inner.is_destroyed() {
            return;
        }
        trace!(id = %inner.id, "queueing keepalive");
        let body = inner.codec.encode(&inner.codec.keepalive());
        inner.enqueue_all(vec![body]).await;
    }
}
