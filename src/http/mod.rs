//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (loopback)
//!     → server.rs (Axum setup, catch-all handler, snapshot capture)
//!     → request.rs (request ID, span)
//!     → [routing::classify picks read or write upstream]
//!     → headers.rs (request side: hop-by-hop, Host, User-Agent)
//!     → forwarder.rs (one upstream attempt, streamed body, no redirects)
//!     → headers.rs (response side: hop-by-hop, framing)
//!     → streamer.rs (bounded chunks back to the caller)
//!
//! Any transport failure before headers are committed:
//!     → error.rs (502 + one log line)
//! ```

pub mod error;
pub mod forwarder;
pub mod headers;
pub mod request;
pub mod server;
pub mod streamer;

pub use error::{ErrorHandler, TransportError, TransportErrorKind};
pub use forwarder::{BodyStream, UpstreamForwarder, UpstreamResponse};
pub use headers::{sanitize_request_headers, sanitize_response_headers, HOP_BY_HOP};
pub use request::X_REQUEST_ID;
pub use server::{ProxyHandle, ProxyServer, ServerError, ServerState};
pub use streamer::{RelayLabel, ResponseStreamer};
