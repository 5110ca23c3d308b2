//! Method-based route classification.
//!
//! # Responsibilities
//! - Map a request method to the read or write upstream
//! - Build the full upstream target URL (base + path + raw query)
//!
//! # Design Decisions
//! - Pure function of (method, path, query, snapshot); no other input
//! - Method comparison is case-insensitive
//! - The query string is appended verbatim, never re-parsed or re-encoded

use std::fmt;
use axum::http::Method;

use crate::config::RouteConfig;

/// Methods served by the read upstream. Everything else is a write.
pub const READ_METHODS: [&str; 4] = ["GET", "HEAD", "OPTIONS", "PROPFIND"];

/// Which upstream a request is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    Read,
    Write,
}

impl RouteClass {
    /// Classify a method.
    pub fn of(method: &Method) -> Self {
        if READ_METHODS
            .iter()
            .any(|read| read.eq_ignore_ascii_case(method.as_str()))
        {
            RouteClass::Read
        } else {
            RouteClass::Write
        }
    }

    /// Label used in log lines and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteClass::Read => "READ",
            RouteClass::Write => "WRITE",
        }
    }

    /// The base URL this class is routed to under `config`.
    pub fn base<'a>(&self, config: &'a RouteConfig) -> &'a str {
        match self {
            RouteClass::Read => &config.read_url,
            RouteClass::Write => &config.write_url,
        }
    }
}

impl fmt::Display for RouteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    pub target_url: String,
    pub class: RouteClass,
}

/// Decide where a request goes.
///
/// `path` is taken without its leading slash; an empty path targets the
/// upstream root (`base + "/"`).
pub fn classify(method: &Method, path: &str, raw_query: Option<&str>, config: &RouteConfig) -> RouteDecision {
    let class = RouteClass::of(method);
    RouteDecision {
        target_url: target_url(class.base(config), path, raw_query),
        class,
    }
}

/// `base + "/" + path`, plus `"?" + query` when a non-empty query exists.
pub fn target_url(base: &str, path: &str, raw_query: Option<&str>) -> String {
    let query = raw_query.filter(|q| !q.is_empty());
    let mut url = String::with_capacity(
        base.len() + 1 + path.len() + query.map_or(0, |q| q.len() + 1),
    );
    url.push_str(base);
    url.push('/');
    url.push_str(path);
    if let Some(query) = query {
        url.push('?');
        url.push_str(query);
    }
    url
}
