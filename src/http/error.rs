//! Transport failures and the 502 they turn into.
//!
//! # Responsibilities
//! - Classify upstream failures (connect, timeout, reset, cancelled)
//! - Produce the one response the proxy manufactures itself
//! - Emit exactly one log line per failure
//!
//! # Design Decisions
//! - The description carries the whole source chain; reqwest's own
//!   Display stops at "error sending request"
//! - No retries here or anywhere else: one proxied call, one attempt

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::Arc;
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;

use crate::observability::{metrics, LogSink};

/// What went wrong talking to the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection refused, DNS failure, unreachable host.
    Connect,
    /// Connect or read deadline elapsed.
    Timeout,
    /// Connection reset or closed early.
    Reset,
    /// The proxy is stopping.
    Cancelled,
    Other,
}

impl TransportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Reset => "reset",
            TransportErrorKind::Cancelled => "cancelled",
            TransportErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed upstream exchange.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{description}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub description: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(
            TransportErrorKind::Cancelled,
            "request cancelled: proxy is stopping",
        )
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if io_kind_in_chain(&err).is_some_and(is_reset_kind) {
            TransportErrorKind::Reset
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, describe_chain(&err))
    }
}

fn io_kind_in_chain(err: &(dyn StdError + 'static)) -> Option<io::ErrorKind> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        current = e.source();
    }
    None
}

fn is_reset_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

/// "outer: cause: root cause", skipping causes already in the outer text.
pub fn describe_chain(err: &(dyn StdError + 'static)) -> String {
    let mut description = err.to_string();
    let mut current = err.source();
    while let Some(cause) = current {
        let text = cause.to_string();
        if !description.contains(&text) {
            description.push_str(": ");
            description.push_str(&text);
        }
        current = cause.source();
    }
    description
}

/// Turns transport failures into downstream responses.
#[derive(Clone)]
pub struct ErrorHandler {
    sink: Arc<dyn LogSink>,
}

impl ErrorHandler {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// 502 with a plain-text description, plus one log line.
    pub fn on_transport_error(&self, err: &TransportError) -> Response {
        let message = format!("Error: {}", err);
        self.sink.append(message.clone());
        metrics::record_upstream_error(err.kind.as_str());
        tracing::debug!(kind = %err.kind, error = %err.description, "Upstream exchange failed");

        let mut response = Response::new(Body::from(message));
        *response.status_mut() = StatusCode::BAD_GATEWAY;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}
