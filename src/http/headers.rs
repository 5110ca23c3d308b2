//! Header sanitization for both directions of the proxy.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers (and any header named in `Connection`)
//! - Request side: drop `Host`, inject a User-Agent when absent
//! - Response side: also drop `Content-Length` and `Content-Encoding`,
//!   because the body is re-framed by the relay and arrives here already
//!   decoded by the upstream client
//!
//! # Design Decisions
//! - Both functions are idempotent
//! - Repeated fields (e.g. several `Set-Cookie`) are preserved in order

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

/// Headers meaningful only for a single transport hop.
pub const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Framing headers that no longer describe a re-streamed body.
pub const RESPONSE_FRAMING: [&str; 2] = ["content-encoding", "content-length"];

/// Whether `name` is in the hop-by-hop set.
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Prepare inbound request headers for the upstream.
pub fn sanitize_request_headers(headers: HeaderMap, user_agent: &HeaderValue) -> HeaderMap {
    let mut headers = strip_hop_by_hop(headers);
    headers.remove(header::HOST);
    if !headers.contains_key(header::USER_AGENT) {
        headers.insert(header::USER_AGENT, user_agent.clone());
    }
    headers
}

/// Prepare upstream response headers for the caller.
pub fn sanitize_response_headers(headers: HeaderMap) -> HeaderMap {
    let mut headers = strip_hop_by_hop(headers);
    for name in RESPONSE_FRAMING {
        headers.remove(name);
    }
    headers
}

fn strip_hop_by_hop(mut headers: HeaderMap) -> HeaderMap {
    // Fields listed in Connection are hop-by-hop for this message too.
    let nominated: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    for name in nominated {
        headers.remove(name);
    }
    headers
}
