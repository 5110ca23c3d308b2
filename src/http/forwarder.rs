//! Upstream forwarding.
//!
//! # Responsibilities
//! - Issue exactly one outbound request per inbound request
//! - Stream the inbound body upstream as it arrives
//! - Hand back status, headers and a lazy body stream
//!
//! # Design Decisions
//! - Redirects are never followed; 3xx and `Location` reach the caller as-is
//! - gzip, brotli, deflate and zstd bodies are decoded here, so the caller
//!   always receives an identity body
//! - Connect and read timeouts are explicit
//! - No cookie store: cookies travel in the caller's own `Cookie` header
//! - Bodies known to be empty are not sent, so GET/HEAD never grow a
//!   chunked framing they did not have

use std::pin::Pin;
use std::time::Duration;
use axum::body::{Body, HttpBody};
use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use futures_util::{Stream, StreamExt, TryStreamExt};

use crate::config::UpstreamConfig;
use crate::http::error::TransportError;

/// Lazy upstream body.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// What the upstream answered, body not yet read.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Sends requests to either upstream over a shared connection pool.
#[derive(Debug, Clone)]
pub struct UpstreamForwarder {
    client: reqwest::Client,
}

impl UpstreamForwarder {
    /// Build the outbound client from config.
    pub fn new(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs));
        if !config.use_system_proxy {
            builder = builder.no_proxy();
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Forward one request.
    ///
    /// `headers` must already be sanitized. The returned body is pulled
    /// from the upstream only as the caller consumes it.
    pub async fn forward(
        &self,
        method: Method,
        target_url: &str,
        headers: HeaderMap,
        body: Body,
    ) -> Result<UpstreamResponse, TransportError> {
        let mut request = self.client.request(method, target_url).headers(headers);
        if !body.is_end_stream() {
            request = request.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let mut response = request.send().await?;

        let status = response.status();
        let headers = std::mem::take(response.headers_mut());
        let body = response.bytes_stream().map_err(TransportError::from).boxed();

        tracing::debug!(url = %target_url, status = %status, "Upstream responded");

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}
