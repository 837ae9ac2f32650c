//! Inbound read loop: accumulate, scrub, extract, classify.

use std::{io, sync::Arc, sync::atomic::Ordering, time::Duration};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{ConnectionEvent, Inner, Lifecycle};
use crate::{
    codec::{Classification, Codec},
    error::ClientError,
    frame,
    metrics,
};

const READ_CHUNK: usize = 8 * 1024;

/// Read until the epoch is cancelled, the peer closes the stream, or the
/// transport fails. The accumulator lives here, so every connection epoch
/// starts with a fresh one.
pub(super) async fn run<C, R>(inner: Arc<Inner<C>>, mut reader: R, token: CancellationToken)
where
    C: Codec,
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut acc = String::new();
    let mut buf = BytesMut::with_capacity(READ_CHUNK);

    loop {
        buf.clear();
        let outcome = tokio::select! {
            () = token.cancelled() => return,
            outcome = read_chunk(&mut reader, &mut buf, inner.config.idle_timeout) => outcome,
        };
        match outcome {
            ReadOutcome::Data => {
                let chunk = String::from_utf8_lossy(&buf);
                acc.push_str(&frame::strip_control(&chunk));
                drain_accumulator(&inner, &mut acc).await;
            }
            ReadOutcome::Idle => {
                inner.emit(ConnectionEvent::Timeout).await;
            }
            ReadOutcome::Eof => {
                handle_end(&inner).await;
                return;
            }
            ReadOutcome::Failed(err) => {
                warn!(id = %inner.id, error = %err, "read failed");
                metrics::inc_errors();
                inner.destroy().await;
                inner.emit(ConnectionEvent::Error(ClientError::Io(err))).await;
                return;
            }
        }
    }
}

enum ReadOutcome {
    Data,
    Eof,
    Idle,
    Failed(io::Error),
}

async fn read_chunk<R>(reader: &mut R, buf: &mut BytesMut, idle: Option<Duration>) -> ReadOutcome
where
    R: AsyncRead + Unpin,
{
    let read = reader.read_buf(buf);
    let result = match idle {
        None => read.await,
        Some(window) => match tokio::time::timeout(window, read).await {
            Ok(result) => result,
            Err(_) => return ReadOutcome::Idle,
        },
    };
    match result {
        Ok(0) => ReadOutcome::Eof,
        Ok(_) => ReadOutcome::Data,
        Err(err) => ReadOutcome::Failed(err),
    }
}

/// Extract every complete event currently in the accumulator. A read that
/// carried several concatenated events resolves fully before the next
/// socket read is processed, preserving extraction order end to end.
async fn drain_accumulator<C: Codec>(inner: &Inner<C>, acc: &mut String) {
    loop {
        let (event, rest) = match frame::next_event(acc) {
            Some(split) => (split.event.to_owned(), split.remainder.to_owned()),
            None => return,
        };
        *acc = rest;
        handle_message(inner, &event).await;
    }
}

async fn handle_message<C: Codec>(inner: &Inner<C>, raw: &str) {
    metrics::inc_events(metrics::Direction::Inbound);
    let event = match inner.codec.decode(raw) {
        Ok(event) => event,
        Err(err) => {
            // One malformed message must not stall the rest of the read.
            warn!(id = %inner.id, error = %err, "discarding undecodable message");
            metrics::inc_errors();
            return;
        }
    };
    match inner.codec.classify(&event) {
        Classification::PingAck => {
            if inner.mark_open().await {
                inner.emit(ConnectionEvent::Open).await;
            }
            inner.emit(ConnectionEvent::Ping).await;
        }
        Classification::Version(Some(version)) => inner.record_peer_version(version).await,
        // A version announcement without the required nested fields is
        // ordinary traffic.
        Classification::Version(None) | Classification::Other => {
            inner.emit(ConnectionEvent::Event(event)).await;
        }
    }
}

async fn handle_end<C: Codec>(inner: &Inner<C>) {
    inner.open.store(false, Ordering::Release);
    inner.shared.lock().await.lifecycle = Lifecycle::Ended;
    inner.emit(ConnectionEvent::End).await;
    // Transport end always tears the timer and socket down together.
    inner.destroy().await;
}
