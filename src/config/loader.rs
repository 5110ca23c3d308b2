//! Configuration loading from and saving to disk.

use std::fs;
use std::path::Path;

use crate::config::schema::{ProxyConfig, RouteConfig};
use crate::config::validation::{validate_config, ConfigError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Toml,
    Json,
}

fn format_of(path: &Path) -> Format {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
        _ => Format::Toml,
    }
}

/// Load, normalize and validate configuration from a TOML or JSON file.
///
/// JSON documents without a `route` table are read as the flat legacy
/// format (`tailscale_url`, `cloudflare_url`, `local_port`).
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config = parse(&content, format_of(path))?.normalized();
    validate_config(&config)?;
    Ok(config)
}

/// Like [`load_config`], but a missing file yields the defaults.
pub fn load_or_default(path: &Path) -> Result<ProxyConfig, ConfigError> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::info!(path = ?path, "Config file not found, using defaults");
        Ok(ProxyConfig::default())
    }
}

/// Write configuration to disk in the format implied by the extension.
pub fn save_config(path: &Path, config: &ProxyConfig) -> Result<(), ConfigError> {
    let content = match format_of(path) {
        Format::Toml => toml::to_string_pretty(config)?,
        Format::Json => serde_json::to_string_pretty(config)?,
    };
    fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse(content: &str, format: Format) -> Result<ProxyConfig, ConfigError> {
    match format {
        Format::Toml => Ok(toml::from_str(content)?),
        Format::Json => {
            let value: serde_json::Value = serde_json::from_str(content)?;
            if value.get("route").is_some() {
                Ok(serde_json::from_value(value)?)
            } else {
                let route: RouteConfig = serde_json::from_value(value)?;
                Ok(ProxyConfig {
                    route,
                    ..ProxyConfig::default()
                })
            }
        }
    }
}
