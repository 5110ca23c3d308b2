//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the split proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Upstream base URLs and the local listen port.
    pub route: RouteConfig,

    /// Outbound client behaviour.
    pub upstream: UpstreamConfig,

    /// Response relay settings.
    pub streaming: StreamingConfig,

    /// Optional bounds on inbound request headers.
    pub limits: LimitsConfig,

    /// Start/stop behaviour.
    pub lifecycle: LifecycleConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ProxyConfig {
    /// Return a copy with both base URLs normalized.
    pub fn normalized(mut self) -> Self {
        self.route = self.route.normalized();
        self
    }
}

/// The routing snapshot: where reads go, where writes go, where we listen.
///
/// Base URLs are stored without a trailing slash.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct RouteConfig {
    /// Upstream for GET, HEAD, OPTIONS and PROPFIND.
    #[serde(alias = "tailscale_url")]
    pub read_url: String,

    /// Upstream for every other method.
    #[serde(alias = "cloudflare_url")]
    pub write_url: String,

    /// Loopback port the proxy binds to.
    #[serde(alias = "local_port", deserialize_with = "port_from_number_or_string")]
    pub listen_port: u16,
}

impl RouteConfig {
    /// Build a snapshot from raw values, normalizing the base URLs.
    pub fn new(read_url: impl Into<String>, write_url: impl Into<String>, listen_port: u16) -> Self {
        Self {
            read_url: read_url.into(),
            write_url: write_url.into(),
            listen_port,
        }
        .normalized()
    }

    /// Strip surrounding whitespace and trailing slashes from both base URLs.
    pub fn normalized(self) -> Self {
        Self {
            read_url: normalize_base(&self.read_url),
            write_url: normalize_base(&self.write_url),
            listen_port: self.listen_port,
        }
    }
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            read_url: "http://192.168.100.10:5000".to_string(),
            write_url: "https://nas.example.com".to_string(),
            listen_port: 8888,
        }
    }
}

fn normalize_base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

// Older settings files stored the port as a string.
fn port_from_number_or_string<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Outbound client configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Maximum idle time between reads from the upstream, in seconds.
    pub read_timeout_secs: u64,

    /// Honor HTTP_PROXY / HTTPS_PROXY from the environment.
    pub use_system_proxy: bool,

    /// Injected when the caller sent no User-Agent.
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            read_timeout_secs: 300,
            use_system_proxy: true,
            user_agent: concat!("split-proxy/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Response relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct StreamingConfig {
    /// Largest chunk written downstream, in bytes.
    pub chunk_size: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self { chunk_size: 4096 }
    }
}

/// Bounds on inbound request headers. `None` means unbounded.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum number of header fields.
    pub max_header_count: Option<usize>,

    /// Maximum combined size of header names and values, in bytes.
    pub max_header_bytes: Option<usize>,

    /// Maximum combined size of all Cookie header values, in bytes.
    pub max_cookie_bytes: Option<usize>,
}

/// Lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LifecycleConfig {
    /// How long `stop` lets in-flight requests drain before cancelling them.
    pub shutdown_grace_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9898".to_string(),
        }
    }
}
