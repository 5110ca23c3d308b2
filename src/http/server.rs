//! HTTP server setup and the proxy control surface.
//!
//! # Responsibilities
//! - Validate config, build the upstream client and bind the loopback
//!   listener (`Stopped → Starting → Running`)
//! - Create the Axum Router with a catch-all handler for every method
//!   (WebDAV extension methods included) on every path
//! - Wire up middleware (request ID, tracing)
//! - Run the per-request pipeline: classify → sanitize → forward → relay,
//!   with transport failures routed to the error handler
//! - Publish route snapshots and stop gracefully through `ProxyHandle`

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::{validate_config, ConfigError, ConfigStore, ProxyConfig, RouteConfig};
use crate::http::error::{ErrorHandler, TransportError};
use crate::http::forwarder::UpstreamForwarder;
use crate::http::headers::sanitize_request_headers;
use crate::http::request::{request_span, MakeRequestUuidV4};
use crate::http::streamer::{RelayLabel, ResponseStreamer};
use crate::lifecycle::{InFlightTracker, Shutdown, ShutdownSignal};
use crate::observability::{metrics, LogSink};
use crate::routing::classify;
use crate::security::RequestLimits;

/// How long `stop` waits for the server task after cancelling everything.
const FORCE_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle state of a [`ProxyServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    /// Listener closed, in-flight requests draining.
    Stopping,
}

/// Error returned by [`ProxyServer::start`].
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build upstream client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("proxy is already {0:?}")]
    NotStopped(ServerState),
}

/// Application state injected into the handler.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<ConfigStore>,
    pub forwarder: UpstreamForwarder,
    pub streamer: ResponseStreamer,
    pub errors: ErrorHandler,
    pub limits: RequestLimits,
    pub user_agent: HeaderValue,
    pub sink: Arc<dyn LogSink>,
    pub tracker: InFlightTracker,
    pub cancel: ShutdownSignal,
}

/// The split proxy, before and between runs.
pub struct ProxyServer {
    config: ProxyConfig,
    sink: Arc<dyn LogSink>,
    state_tx: Arc<watch::Sender<ServerState>>,
}

impl ProxyServer {
    /// Create a stopped server. Nothing is validated or bound yet.
    pub fn new(config: ProxyConfig, sink: Arc<dyn LogSink>) -> Self {
        let (state_tx, _) = watch::channel(ServerState::Stopped);
        Self {
            config,
            sink,
            state_tx: Arc::new(state_tx),
        }
    }

    /// Current lifecycle state, including that of a handle returned by `start`.
    pub fn state(&self) -> ServerState {
        *self.state_tx.borrow()
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Validate, bind `127.0.0.1:<listen_port>` and start serving.
    ///
    /// Fails fast with [`ServerError::Config`] on an invalid configuration;
    /// the server is then back in `Stopped`.
    pub async fn start(&self) -> Result<ProxyHandle, ServerError> {
        let current = self.state();
        if current != ServerState::Stopped {
            return Err(ServerError::NotStopped(current));
        }
        self.state_tx.send_replace(ServerState::Starting);

        match self.try_start().await {
            Ok(handle) => {
                self.state_tx.send_replace(ServerState::Running);
                Ok(handle)
            }
            Err(e) => {
                self.state_tx.send_replace(ServerState::Stopped);
                self.sink.append(format!("Failed to start: {}", e));
                Err(e)
            }
        }
    }

    async fn try_start(&self) -> Result<ProxyHandle, ServerError> {
        let config = self.config.clone().normalized();
        validate_config(&config)?;

        let forwarder = UpstreamForwarder::new(&config.upstream).map_err(ServerError::Client)?;
        let user_agent = HeaderValue::from_str(&config.upstream.user_agent)
            .unwrap_or_else(|_| HeaderValue::from_static("split-proxy"));

        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, config.route.listen_port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let shutdown = Shutdown::new();
        let routes = Arc::new(ConfigStore::new(config.route.clone()));
        let tracker = InFlightTracker::new();

        let state = AppState {
            routes: Arc::clone(&routes),
            forwarder,
            streamer: ResponseStreamer::new(
                config.streaming.chunk_size,
                Arc::clone(&self.sink),
                shutdown.cancel_signal(),
            ),
            errors: ErrorHandler::new(Arc::clone(&self.sink)),
            limits: RequestLimits::new(config.limits.clone()),
            user_agent,
            sink: Arc::clone(&self.sink),
            tracker: tracker.clone(),
            cancel: shutdown.cancel_signal(),
        };

        let app = build_router(state);
        let mut drain = shutdown.drain_signal();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { drain.triggered().await })
                .await
        });

        tracing::info!(
            address = %local_addr,
            read = %config.route.read_url,
            write = %config.route.write_url,
            "Proxy listening"
        );
        self.sink.append(format!("Proxy listening on http://{}", local_addr));
        self.sink.append(format!("READ  -> {}", config.route.read_url));
        self.sink.append(format!("WRITE -> {}", config.route.write_url));

        Ok(ProxyHandle {
            local_addr,
            routes,
            shutdown,
            tracker,
            task: Some(task),
            sink: Arc::clone(&self.sink),
            state_tx: Arc::clone(&self.state_tx),
            grace: Duration::from_secs(config.lifecycle.shutdown_grace_secs),
        })
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .fallback(proxy_handler)
        .with_state(state)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV4))
}

type ServeTask = JoinHandle<std::io::Result<()>>;

/// Control handle for a running proxy.
///
/// Dropping the handle without calling [`ProxyHandle::stop`] cancels all
/// in-flight work immediately. The server returns to `Stopped` once its
/// listener has been released.
pub struct ProxyHandle {
    local_addr: SocketAddr,
    routes: Arc<ConfigStore>,
    shutdown: Shutdown,
    tracker: InFlightTracker,
    task: Option<ServeTask>,
    sink: Arc<dyn LogSink>,
    state_tx: Arc<watch::Sender<ServerState>>,
    grace: Duration,
}

impl ProxyHandle {
    /// The bound listener address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ServerState {
        *self.state_tx.borrow()
    }

    /// Observe lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ServerState> {
        self.state_tx.subscribe()
    }

    /// The route snapshot new requests will use.
    pub fn snapshot(&self) -> Arc<RouteConfig> {
        self.routes.snapshot()
    }

    /// Requests currently being proxied, bodies included.
    pub fn in_flight(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Publish a new route snapshot. Requests already in flight keep the
    /// snapshot they started with.
    ///
    /// A different `listen_port` is stored but only takes effect on the next start.
    pub fn publish(&self, route: RouteConfig) -> Result<(), ConfigError> {
        let port = route.listen_port;
        let previous = self.routes.publish(route)?;
        let current = self.routes.snapshot();

        tracing::info!(
            read = %current.read_url,
            write = %current.write_url,
            previous_read = %previous.read_url,
            previous_write = %previous.write_url,
            "Route snapshot published"
        );
        self.sink.append(format!(
            "Routing updated: READ -> {}, WRITE -> {}",
            current.read_url, current.write_url
        ));
        if port != self.local_addr.port() {
            self.sink.append(format!(
                "Listen port {} takes effect after restart (still on {})",
                port,
                self.local_addr.port()
            ));
        }
        Ok(())
    }

    /// Stop using the configured grace period.
    pub async fn stop(self) {
        let grace = self.grace;
        self.stop_with_grace(grace).await
    }

    /// Close the listener, let in-flight requests finish for up to `grace`,
    /// then cancel whatever is left.
    pub async fn stop_with_grace(mut self, grace: Duration) {
        self.state_tx.send_replace(ServerState::Stopping);
        self.shutdown.begin_drain();
        tracing::info!(in_flight = self.tracker.active_count(), "Draining");

        if !self.tracker.wait_idle(grace).await {
            tracing::warn!(
                in_flight = self.tracker.active_count(),
                "Grace period elapsed, cancelling in-flight requests"
            );
        }
        self.shutdown.cancel();

        if let Some(task) = self.task.take() {
            close(task, &self.state_tx, self.sink.as_ref()).await;
        }
    }
}

impl Drop for ProxyHandle {
    fn drop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        tracing::warn!("Proxy handle dropped without stop, cancelling in-flight requests");
        self.state_tx.send_replace(ServerState::Stopping);
        self.shutdown.cancel();

        let state_tx = Arc::clone(&self.state_tx);
        let sink = Arc::clone(&self.sink);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { close(task, &state_tx, sink.as_ref()).await });
            }
            Err(_) => {
                task.abort();
                state_tx.send_replace(ServerState::Stopped);
                sink.append("Proxy stopped".to_string());
            }
        }
    }
}

/// Wait for the serve task to release the listener, then mark the server stopped.
async fn close(mut task: ServeTask, state_tx: &watch::Sender<ServerState>, sink: &dyn LogSink) {
    match tokio::time::timeout(FORCE_CLOSE_TIMEOUT, &mut task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::error!(error = %e, "Server exited with error"),
        Ok(Err(e)) => tracing::error!(error = %e, "Server task failed"),
        Err(_) => {
            tracing::warn!("Server did not close in time, aborting");
            task.abort();
            let _ = task.await;
        }
    }

    state_tx.send_replace(ServerState::Stopped);
    sink.append("Proxy stopped".to_string());
}

/// Main proxy handler: one upstream attempt per request.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let in_flight = state.tracker.track();
    let start_time = Instant::now();
    let route = state.routes.snapshot();

    let (parts, body) = request.into_parts();
    let raw_path = parts.uri.path();
    let path = raw_path.strip_prefix('/').unwrap_or(raw_path);
    let decision = classify(&parts.method, path, parts.uri.query(), &route);
    let method_str = parts.method.to_string();
    let route_label = decision.class.as_str();

    state
        .sink
        .append(format!("[{}] {}: /{}", method_str, decision.class, path));
    tracing::debug!(
        method = %method_str,
        route = route_label,
        url = %decision.target_url,
        "Proxying request"
    );

    if let Err(violation) = state.limits.check(&parts.headers) {
        state
            .sink
            .append(format!("Rejected [{}] /{}: {}", method_str, path, violation));
        let status = StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE;
        metrics::record_request(&method_str, route_label, status.as_u16(), start_time);
        return (status, violation.to_string()).into_response();
    }

    let label = RelayLabel {
        method: method_str.clone(),
        path: path.to_string(),
    };
    let headers = sanitize_request_headers(parts.headers, &state.user_agent);

    let mut cancel = state.cancel.clone();
    let forwarded = tokio::select! {
        result = state.forwarder.forward(parts.method, &decision.target_url, headers, body) => result,
        _ = cancel.triggered() => Err(TransportError::cancelled()),
    };

    match forwarded {
        Ok(upstream) => {
            metrics::record_request(&method_str, route_label, upstream.status.as_u16(), start_time);
            state.streamer.stream(upstream, label, Some(in_flight))
        }
        Err(err) => {
            metrics::record_request(
                &method_str,
                route_label,
                StatusCode::BAD_GATEWAY.as_u16(),
                start_time,
            );
            state.errors.on_transport_error(&err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LimitsConfig, UpstreamConfig};
    use crate::observability::MemorySink;
    use axum::http::header;
    use tower::ServiceExt;

    fn app_state(route: RouteConfig, limits: LimitsConfig, sink: &MemorySink, shutdown: &Shutdown) -> AppState {
        let config = ProxyConfig {
            route,
            limits,
            ..ProxyConfig::default()
        };
        let sink: Arc<dyn LogSink> = Arc::new(sink.clone());
        AppState {
            routes: Arc::new(ConfigStore::new(config.route.clone())),
            forwarder: UpstreamForwarder::new(&UpstreamConfig {
                use_system_proxy: false,
                connect_timeout_secs: 1,
                ..UpstreamConfig::default()
            })
            .unwrap(),
            streamer: ResponseStreamer::new(4096, Arc::clone(&sink), shutdown.cancel_signal()),
            errors: ErrorHandler::new(Arc::clone(&sink)),
            limits: RequestLimits::new(config.limits.clone()),
            user_agent: HeaderValue::from_static("split-proxy-test"),
            sink,
            tracker: InFlightTracker::new(),
            cancel: shutdown.cancel_signal(),
        }
    }

    fn unreachable_route() -> RouteConfig {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let dead = format!("http://127.0.0.1:{}", port);
        RouteConfig::new(dead.clone(), dead, 8888)
    }

    #[tokio::test]
    async fn unreachable_upstream_yields_502_with_request_id() {
        let sink = MemorySink::new();
        let shutdown = Shutdown::new();
        let app = build_router(app_state(unreachable_route(), LimitsConfig::default(), &sink, &shutdown));

        let request = Request::builder()
            .method("MKCOL")
            .uri("/new/folder")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(response.headers().get(crate::http::X_REQUEST_ID).is_some());
        assert_eq!(sink.lines()[0], "[MKCOL] WRITE: /new/folder");
        assert_eq!(sink.lines_starting_with("Error: ").len(), 1);
    }

    #[tokio::test]
    async fn header_limits_reject_with_431() {
        let sink = MemorySink::new();
        let shutdown = Shutdown::new();
        let limits = LimitsConfig {
            max_header_count: Some(2),
            ..LimitsConfig::default()
        };
        let app = build_router(app_state(unreachable_route(), limits, &sink, &shutdown));

        let request = Request::builder()
            .uri("/a")
            .header(header::ACCEPT, "*/*")
            .header(header::COOKIE, "a=1")
            .header(header::USER_AGENT, "test")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE);
        assert_eq!(sink.lines_starting_with("Rejected [GET] /a: ").len(), 1);
        assert!(sink.lines_starting_with("Error").is_empty());
    }

    #[tokio::test]
    async fn cancelled_request_is_answered_with_502() {
        let sink = MemorySink::new();
        let shutdown = Shutdown::new();
        let silent = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", silent.local_addr().unwrap());
        let route = RouteConfig::new(url.clone(), url, 8888);
        let app = build_router(app_state(route, LimitsConfig::default(), &sink, &shutdown));

        let request = Request::builder().uri("/stuck").body(Body::empty()).unwrap();
        let pending = tokio::spawn(app.oneshot(request));
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.cancel();

        let response = tokio::time::timeout(Duration::from_secs(2), pending)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(sink.lines_starting_with("Error: ").len(), 1);
    }

    #[tokio::test]
    async fn start_rejects_invalid_config() {
        let sink = MemorySink::new();
        let config = ProxyConfig {
            route: RouteConfig::new("http://reads", "", 8888),
            ..ProxyConfig::default()
        };
        let server = ProxyServer::new(config, Arc::new(sink.clone()));

        assert!(matches!(server.start().await, Err(ServerError::Config(_))));
        assert_eq!(server.state(), ServerState::Stopped);
    }
}
