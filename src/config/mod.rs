//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, or legacy JSON)
//!     → loader.rs (parse & deserialize)
//!     → schema.rs (normalize base URLs)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!
//! Route snapshots:
//!     ProxyHandle::publish(RouteConfig)
//!     → validation.rs
//!     → store.rs (atomic swap of Arc<RouteConfig>)
//!     → requests starting afterwards observe the new snapshot
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → caller publishes the route section
//! ```
//!
//! # Design Decisions
//! - A snapshot is captured once per request; nothing mutates mid-flight
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod store;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, load_or_default, save_config};
pub use schema::{
    LifecycleConfig, LimitsConfig, ObservabilityConfig, ProxyConfig, RouteConfig,
    StreamingConfig, UpstreamConfig,
};
pub use store::ConfigStore;
pub use validation::{validate_config, ConfigError};
