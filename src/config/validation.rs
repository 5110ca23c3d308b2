//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Base URLs are non-empty, absolute http(s) URLs with a host
//! - Listen port and chunk size are usable
//!
//! # Design Decisions
//! - Validation is a pure function over an already-normalized config
//! - Runs before a config is accepted into the system, both at start
//!   and when a new route snapshot is published

use std::path::PathBuf;
use url::Url;

use crate::config::schema::{ProxyConfig, RouteConfig};

/// Error type for loading and validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} is empty")]
    EmptyUrl { field: &'static str },

    #[error("{field} '{value}' is not a usable upstream URL: {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("listen port {0} is not valid")]
    InvalidPort(u16),

    #[error("streaming chunk size must be greater than zero")]
    InvalidChunkSize,

    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    ParseToml(#[from] toml::de::Error),

    #[error("Parse error: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Validate a full proxy configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    config.route.validate()?;
    if config.streaming.chunk_size == 0 {
        return Err(ConfigError::InvalidChunkSize);
    }
    Ok(())
}

impl RouteConfig {
    /// Check that both upstreams are usable and the port can be bound.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_base_url("read_url", &self.read_url)?;
        validate_base_url("write_url", &self.write_url)?;
        if self.listen_port == 0 {
            return Err(ConfigError::InvalidPort(self.listen_port));
        }
        Ok(())
    }
}

fn validate_base_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyUrl { field });
    }

    let invalid = |reason: String| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        reason,
    };

    let parsed = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme '{}'", other))),
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    if value.ends_with('/') {
        return Err(invalid("trailing slash".to_string()));
    }
    Ok(())
}
