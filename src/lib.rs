//! Split WebDAV reverse proxy library.
//!
//! Reads (`GET`, `HEAD`, `OPTIONS`, `PROPFIND`) are forwarded to one
//! upstream, everything else to another, with bodies streamed in both
//! directions.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::{ProxyConfig, RouteConfig};
pub use http::{ProxyHandle, ProxyServer, ServerError, ServerState};
pub use observability::LogSink;
