//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Start (http/server.rs):
//!     Stopped → Starting (validate config, build client, bind) → Running
//!     any failure → Stopped + error to the caller
//!
//! Stop (shutdown.rs + drain.rs):
//!     drain signal → listener closed, idle connections closed
//!     → wait for in-flight requests (bounded grace period)
//!     → cancel signal → pending upstream calls and relays aborted
//!     → Stopped
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, cancel
//! - Shutdown has a deadline; nothing waits forever on a slow client
//! - Dropping every signal sender counts as a cancel

pub mod drain;
pub mod shutdown;

pub use drain::{InFlightGuard, InFlightTracker};
pub use shutdown::{Shutdown, ShutdownSignal};
