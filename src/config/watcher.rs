//! Configuration file watcher for hot reload.
//!
//! Only the `[route]` section is applied to a running proxy. Changes to
//! any other section are reported and take effect on the next start.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::{ProxyConfig, RouteConfig};

/// Watches one configuration file and emits new route snapshots.
pub struct ConfigWatcher {
    path: PathBuf,
    last: Arc<Mutex<ProxyConfig>>,
    update_tx: mpsc::UnboundedSender<RouteConfig>,
}

impl ConfigWatcher {
    /// Create a watcher for `path`, starting from the config currently in use.
    ///
    /// The receiver yields a validated [`RouteConfig`] each time the file's
    /// route section changes.
    pub fn new(path: &Path, current: ProxyConfig) -> (Self, mpsc::UnboundedReceiver<RouteConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            last: Arc::new(Mutex::new(current)),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. Keep the returned watcher alive for as long as
    /// updates are wanted.
    ///
    /// The parent directory is watched so that editors replacing the file
    /// (write to temp, rename over) are still noticed.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = self.path.file_name().map(|name| name.to_os_string());
        let Self {
            path,
            last,
            update_tx,
        } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if ours && (event.kind.is_modify() || event.kind.is_create()) {
                        reload(&path, &last, &update_tx);
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?watched, "Config watcher started");
        Ok(watcher)
    }
}

fn reload(path: &Path, last: &Mutex<ProxyConfig>, tx: &mpsc::UnboundedSender<RouteConfig>) {
    let next = match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to reload config, keeping current routing");
            return;
        }
    };

    let mut last = match last.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if *last == next {
        return;
    }

    let route_changed = last.route != next.route;
    let rest_changed = ProxyConfig {
        route: next.route.clone(),
        ..last.clone()
    } != next;
    if rest_changed {
        tracing::warn!(path = ?path, "Only [route] is applied live; other changes need a restart");
    }
    if route_changed {
        tracing::info!(
            read = %next.route.read_url,
            write = %next.route.write_url,
            "Config file changed routing"
        );
        let _ = tx.send(next.route.clone());
    }
    *last = next;
}
