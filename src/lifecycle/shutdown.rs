//! Shutdown coordination for the proxy.

use tokio::sync::watch;

/// Coordinator for two-phase shutdown.
///
/// The drain phase stops new work; the cancel phase aborts whatever is
/// still running. Tasks hold cheap [`ShutdownSignal`] receivers.
#[derive(Debug)]
pub struct Shutdown {
    drain_tx: watch::Sender<bool>,
    cancel_tx: watch::Sender<bool>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (drain_tx, _) = watch::channel(false);
        let (cancel_tx, _) = watch::channel(false);
        Self {
            drain_tx,
            cancel_tx,
        }
    }

    /// Signal that fires when draining begins.
    pub fn drain_signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.drain_tx.subscribe(),
        }
    }

    /// Signal that fires when in-flight work must be abandoned.
    pub fn cancel_signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.cancel_tx.subscribe(),
        }
    }

    /// Stop accepting new work.
    pub fn begin_drain(&self) {
        self.drain_tx.send_replace(true);
    }

    /// Abort in-flight work. Implies draining.
    pub fn cancel(&self) {
        self.drain_tx.send_replace(true);
        self.cancel_tx.send_replace(true);
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of one shutdown phase.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolve once the phase has been triggered or the coordinator is gone.
    pub async fn triggered(&mut self) {
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }

    /// Non-blocking check.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }
}
