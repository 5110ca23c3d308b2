//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → limits.rs (header count, header bytes, cookie bytes)
//!     → Pass to routing
//! ```
//!
//! # Design Decisions
//! - Every bound is opt-in; an unset bound never rejects anything
//! - Checked before any upstream connection is attempted

pub mod limits;

pub use limits::{LimitViolation, RequestLimits};
