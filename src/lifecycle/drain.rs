//! In-flight request tracking.
//!
//! # Responsibilities
//! - Count requests from routing until their response body is finished
//! - Let `stop` wait for that count to reach zero, with a deadline

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Global atomic counter for request sequence numbers.
/// Relaxed ordering is enough; we only need uniqueness.
static REQUEST_SEQ: AtomicU64 = AtomicU64::new(1);

/// Tracks in-flight requests for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct InFlightTracker {
    active: Arc<AtomicU64>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new in-flight request. Returns a guard that decrements on drop.
    pub fn track(&self) -> InFlightGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            active: Arc::clone(&self.active),
            seq: REQUEST_SEQ.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Current number of in-flight requests.
    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait until no request is in flight. Returns `false` if `deadline`
    /// elapsed first.
    pub async fn wait_idle(&self, deadline: Duration) -> bool {
        let until = Instant::now() + deadline;
        while self.active_count() > 0 {
            if Instant::now() >= until {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        true
    }
}

/// Guard that marks one request as in flight.
#[derive(Debug)]
pub struct InFlightGuard {
    active: Arc<AtomicU64>,
    seq: u64,
}

impl InFlightGuard {
    /// Sequence number of this request within the process.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(request_seq = self.seq, "Request finished");
    }
}
