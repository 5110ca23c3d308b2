//! Request header limits.
//!
//! # Responsibilities
//! - Enforce maximum header count
//! - Enforce maximum total header size
//! - Enforce maximum Cookie size
//!
//! # Design Decisions
//! - Limits checked before the request is forwarded (early rejection)
//! - Violations map to 431 Request Header Fields Too Large

use axum::http::{header, HeaderMap};

use crate::config::LimitsConfig;

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitViolation {
    #[error("{count} header fields exceed the limit of {max}")]
    TooManyHeaders { count: usize, max: usize },

    #[error("{bytes} bytes of headers exceed the limit of {max}")]
    HeadersTooLarge { bytes: usize, max: usize },

    #[error("{bytes} bytes of cookies exceed the limit of {max}")]
    CookiesTooLarge { bytes: usize, max: usize },
}

/// Header bounds applied to every inbound request.
#[derive(Debug, Clone, Default)]
pub struct RequestLimits {
    config: LimitsConfig,
}

impl RequestLimits {
    pub fn new(config: LimitsConfig) -> Self {
        Self { config }
    }

    /// Check `headers` against every configured bound.
    pub fn check(&self, headers: &HeaderMap) -> Result<(), LimitViolation> {
        if let Some(max) = self.config.max_header_count {
            let count = headers.len();
            if count > max {
                return Err(LimitViolation::TooManyHeaders { count, max });
            }
        }

        if let Some(max) = self.config.max_header_bytes {
            let bytes = headers
                .iter()
                .map(|(name, value)| name.as_str().len() + value.len())
                .sum();
            if bytes > max {
                return Err(LimitViolation::HeadersTooLarge { bytes, max });
            }
        }

        if let Some(max) = self.config.max_cookie_bytes {
            let bytes = headers
                .get_all(header::COOKIE)
                .iter()
                .map(|value| value.len())
                .sum();
            if bytes > max {
                return Err(LimitViolation::CookiesTooLarge { bytes, max });
            }
        }

        Ok(())
    }
}
