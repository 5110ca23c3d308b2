//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path, raw query)
//!     + RouteConfig snapshot captured at request start
//!     → classifier.rs (read or write?)
//!     → Return: RouteDecision { target_url, class }
//! ```
//!
//! # Design Decisions
//! - Only the method decides the route; headers and body never do
//! - Deterministic: same input always yields the same decision
//! - No error path: an unusable base URL is rejected when the snapshot
//!   is validated, not per request

pub mod classifier;

pub use classifier::{classify, target_url, RouteClass, RouteDecision, READ_METHODS};
