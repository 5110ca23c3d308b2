//! Response relay.
//!
//! # Responsibilities
//! - Commit status and sanitized headers first
//! - Relay the upstream body in chunks of at most `chunk_size` bytes
//! - End the connection on a mid-stream failure or on cancel
//!
//! # Design Decisions
//! - Pull-driven: the next upstream read happens only after the previous
//!   chunk was taken by the downstream writer, so a slow client stalls the
//!   upstream instead of growing a buffer
//! - Re-chunking slices the upstream `Bytes` without copying
//! - Once headers are out there is no second response; failures are logged

use std::fmt;
use std::io;
use std::sync::Arc;
use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use futures_util::{stream, Stream, StreamExt};

use crate::http::error::TransportError;
use crate::http::forwarder::{BodyStream, UpstreamResponse};
use crate::http::headers::sanitize_response_headers;
use crate::lifecycle::{InFlightGuard, ShutdownSignal};
use crate::observability::{metrics, LogSink};

/// Identifies a relay in log lines, e.g. `[GET] /files/a.txt`.
#[derive(Debug, Clone)]
pub struct RelayLabel {
    pub method: String,
    pub path: String,
}

impl fmt::Display for RelayLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] /{}", self.method, self.path)
    }
}

/// Relays upstream responses to the caller.
#[derive(Clone)]
pub struct ResponseStreamer {
    chunk_size: usize,
    sink: Arc<dyn LogSink>,
    cancel: ShutdownSignal,
}

impl ResponseStreamer {
    pub fn new(chunk_size: usize, sink: Arc<dyn LogSink>, cancel: ShutdownSignal) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            sink,
            cancel,
        }
    }

    /// Build the downstream response. The body keeps `guard` alive until
    /// it is finished or dropped.
    pub fn stream(&self, upstream: UpstreamResponse, label: RelayLabel, guard: Option<InFlightGuard>) -> Response {
        let body = Body::from_stream(self.relay(upstream.body, label, guard));
        let mut response = Response::new(body);
        *response.status_mut() = upstream.status;
        *response.headers_mut() = sanitize_response_headers(upstream.headers);
        response
    }

    /// The re-chunked body stream on its own.
    pub fn relay(
        &self,
        upstream: BodyStream,
        label: RelayLabel,
        guard: Option<InFlightGuard>,
    ) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static {
        let relay = Relay {
            upstream,
            pending: Bytes::new(),
            chunk_size: self.chunk_size,
            sink: Arc::clone(&self.sink),
            cancel: self.cancel.clone(),
            label,
            finished: false,
            _guard: guard,
        };
        stream::unfold(relay, |mut relay| async move {
            let item = relay.next_chunk().await?;
            Some((item, relay))
        })
    }
}

struct Relay {
    upstream: BodyStream,
    pending: Bytes,
    chunk_size: usize,
    sink: Arc<dyn LogSink>,
    cancel: ShutdownSignal,
    label: RelayLabel,
    finished: bool,
    _guard: Option<InFlightGuard>,
}

impl Relay {
    async fn next_chunk(&mut self) -> Option<Result<Bytes, io::Error>> {
        if self.finished {
            return None;
        }

        while self.pending.is_empty() {
            let next = tokio::select! {
                biased;
                _ = self.cancel.triggered() => {
                    self.finished = true;
                    tracing::info!(request = %self.label, "Relay cancelled by shutdown");
                    return Some(Err(io::Error::new(io::ErrorKind::Interrupted, "proxy is stopping")));
                }
                next = self.upstream.next() => next,
            };

            match next {
                None => {
                    self.finished = true;
                    return None;
                }
                Some(Ok(bytes)) => self.pending = bytes,
                Some(Err(err)) => return Some(Err(self.abort(err))),
            }
        }

        let take = self.pending.len().min(self.chunk_size);
        Some(Ok(self.pending.split_to(take)))
    }

    fn abort(&mut self, err: TransportError) -> io::Error {
        self.finished = true;
        self.sink
            .append(format!("Stream aborted {}: {}", self.label, err));
        metrics::record_stream_abort();
        io::Error::other(err)
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        if !self.finished {
            tracing::info!(request = %self.label, "Client disconnected before response completed");
        }
    }
}
