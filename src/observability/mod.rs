//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Proxy core produces:
//!     → logging.rs (LogSink lines for the presentation layer,
//!                   tracing events for diagnostics)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → Console / UI panel / log file (whatever implements LogSink)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - The core never knows how lines are displayed; it only appends
//! - Concurrency safety is the sink's job, not the proxy's
//! - Metrics are cheap no-ops when no recorder is installed

pub mod logging;
pub mod metrics;

pub use logging::{ChannelSink, LogSink, MemorySink, TracingSink};
