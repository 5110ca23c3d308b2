//! Structured logging and the injected log sink.
//!
//! # Responsibilities
//! - Define the `LogSink` append interface the proxy writes its lines to
//! - Provide stock sinks (tracing, channel, in-memory)
//! - Initialize the tracing subscriber for the binary
//!
//! # Design Decisions
//! - Uses tracing crate for structured diagnostics
//! - Log level configurable via config and `RUST_LOG`

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Destination for the proxy's human-readable log lines.
///
/// One line per routed request and one per failure. Implementations must
/// tolerate concurrent calls.
pub trait LogSink: Send + Sync + 'static {
    fn append(&self, line: String);
}

impl<F> LogSink for F
where
    F: Fn(String) + Send + Sync + 'static,
{
    fn append(&self, line: String) {
        self(line)
    }
}

/// Forwards every line to `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn append(&self, line: String) {
        tracing::info!(target: "split_proxy::log", "{}", line);
    }
}

/// Forwards lines into a channel, e.g. for a UI log panel.
///
/// Lines are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl LogSink for ChannelSink {
    fn append(&self, line: String) {
        let _ = self.tx.send(line);
    }
}

/// Keeps every line in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all lines appended so far.
    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Lines starting with `prefix`.
    pub fn lines_starting_with(&self, prefix: &str) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| line.starts_with(prefix))
            .collect()
    }
}

impl LogSink for MemorySink {
    fn append(&self, line: String) {
        match self.lines.lock() {
            Ok(mut lines) => lines.push(line),
            Err(poisoned) => poisoned.into_inner().push(line),
        }
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_level` when set.
pub fn init_tracing(default_level: &str) {
    let fallback = format!(
        "split_proxy={level},tower_http={level}",
        level = default_level
    );
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
