//! Shared route snapshot.
//!
//! # Design Decisions
//! - The control plane swaps in a whole new `Arc<RouteConfig>`
//! - Requests call `load_full` once and keep that `Arc` until they finish,
//!   so no request ever observes a value changing mid-flight
//! - No locks on the request path

use std::sync::Arc;
use arc_swap::ArcSwap;

use crate::config::schema::RouteConfig;
use crate::config::validation::ConfigError;

/// Atomically replaceable, read-mostly holder of the active [`RouteConfig`].
#[derive(Debug)]
pub struct ConfigStore {
    current: ArcSwap<RouteConfig>,
}

impl ConfigStore {
    /// Create a store holding an already validated snapshot.
    pub fn new(initial: RouteConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// Capture the active snapshot.
    pub fn snapshot(&self) -> Arc<RouteConfig> {
        self.current.load_full()
    }

    /// Normalize, validate and publish a new snapshot.
    ///
    /// Returns the snapshot that was replaced.
    pub fn publish(&self, next: RouteConfig) -> Result<Arc<RouteConfig>, ConfigError> {
        let next = next.normalized();
        next.validate()?;
        Ok(self.current.swap(Arc::new(next)))
    }
}
