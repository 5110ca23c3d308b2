//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use bytes::Bytes;
use futures_util::stream;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use split_proxy::observability::MemorySink;
use split_proxy::{ProxyConfig, ProxyHandle, ProxyServer, RouteConfig};

/// One request as seen by a mock upstream.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

struct UpstreamState {
    name: &'static str,
    requests: Mutex<Vec<Recorded>>,
    produced: Arc<AtomicU64>,
    generator_dropped: Arc<AtomicBool>,
}

/// A programmable upstream recording every request it receives.
///
/// Paths with special behaviour:
/// - `/missing` → 404 "missing"
/// - `/redirect` → 302 to `http://elsewhere.example/target`
/// - `/slow` → answers after 300ms
/// - `/hang` → never answers
/// - `/big/<n>` → streams `n` bytes, byte `k` is `k % 251`
/// - `/endless` → streams until the reader goes away
/// - `/gzip` → "hello world" gzip-encoded, with `Content-Encoding: gzip`
/// - anything else → 200 "<name> <METHOD> <uri>"
pub struct MockUpstream {
    pub addr: SocketAddr,
    state: Arc<UpstreamState>,
}

impl MockUpstream {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Bytes handed to the socket by `/endless` so far.
    pub fn produced(&self) -> u64 {
        self.state.produced.load(Ordering::SeqCst)
    }

    /// Whether the `/endless` body stream has been dropped.
    pub fn generator_dropped(&self) -> bool {
        self.state.generator_dropped.load(Ordering::SeqCst)
    }
}

pub async fn start_upstream(name: &'static str) -> MockUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(UpstreamState {
        name,
        requests: Mutex::new(Vec::new()),
        produced: Arc::new(AtomicU64::new(0)),
        generator_dropped: Arc::new(AtomicBool::new(false)),
    });

    let app = Router::new()
        .fallback(upstream_handler)
        .with_state(Arc::clone(&state));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockUpstream { addr, state }
}

async fn upstream_handler(State(state): State<Arc<UpstreamState>>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
    let path = parts.uri.path().to_string();
    let uri = parts.uri.to_string();
    state.requests.lock().unwrap().push(Recorded {
        method: parts.method.to_string(),
        uri: uri.clone(),
        headers: parts.headers.clone(),
        body,
    });

    match path.as_str() {
        "/missing" => (StatusCode::NOT_FOUND, "missing").into_response(),
        "/redirect" => (
            StatusCode::FOUND,
            [(header::LOCATION, "http://elsewhere.example/target")],
            "",
        )
            .into_response(),
        "/slow" => {
            tokio::time::sleep(Duration::from_millis(300)).await;
            (StatusCode::OK, format!("{} slow", state.name)).into_response()
        }
        "/hang" => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            StatusCode::OK.into_response()
        }
        "/endless" => endless_body(&state),
        "/gzip" => (
            StatusCode::OK,
            [(header::CONTENT_ENCODING, "gzip")],
            Bytes::from_static(HELLO_WORLD_GZIP),
        )
            .into_response(),
        p if p.starts_with("/big/") => {
            let size: u64 = p["/big/".len()..].parse().unwrap_or(0);
            patterned_body(size)
        }
        _ => (
            StatusCode::OK,
            [("x-upstream", state.name)],
            format!("{} {} {}", state.name, parts.method, uri),
        )
            .into_response(),
    }
}

const GEN_CHUNK: u64 = 64 * 1024;

/// `gzip("hello world")` with a zero mtime.
const HELLO_WORLD_GZIP: &[u8] = &[
    31, 139, 8, 0, 0, 0, 0, 0, 2, 3, 203, 72, 205, 201, 201, 87, 40, 207, 47, 202, 73, 1, 0, 133,
    17, 74, 13, 11, 0, 0, 0,
];

/// Expected byte at `offset` of a `/big/<n>` body.
pub fn pattern_byte(offset: u64) -> u8 {
    (offset % 251) as u8
}

fn patterned_body(size: u64) -> Response {
    let chunks = stream::unfold(0u64, move |offset| async move {
        if offset >= size {
            return None;
        }
        let end = (offset + GEN_CHUNK).min(size);
        let chunk: Vec<u8> = (offset..end).map(pattern_byte).collect();
        Some((Ok::<_, std::io::Error>(Bytes::from(chunk)), end))
    });
    Response::new(Body::from_stream(chunks))
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn endless_body(state: &UpstreamState) -> Response {
    let produced = Arc::clone(&state.produced);
    let flag = DropFlag(Arc::clone(&state.generator_dropped));
    let chunks = stream::unfold((produced, flag), |(produced, flag)| async move {
        produced.fetch_add(GEN_CHUNK, Ordering::SeqCst);
        let chunk = Bytes::from(vec![b'x'; GEN_CHUNK as usize]);
        Some((Ok::<_, std::io::Error>(chunk), (produced, flag)))
    });
    Response::new(Body::from_stream(chunks))
}

/// Upstream that sends headers promising 100 bytes, sends 10, then closes.
pub async fn start_truncating_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n0123456789")
                    .await;
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_millis(50)).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// Upstream that accepts connections and never writes a byte.
pub async fn start_silent_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// A loopback port with nothing listening on it.
pub fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn proxy_config(read_url: &str, write_url: &str) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.route = RouteConfig::new(read_url, write_url, unused_port());
    config.upstream.use_system_proxy = false;
    config.upstream.connect_timeout_secs = 2;
    config.upstream.read_timeout_secs = 10;
    config.lifecycle.shutdown_grace_secs = 1;
    config
}

/// Start a proxy with a memory sink.
pub async fn start_proxy(config: ProxyConfig) -> (ProxyHandle, MemorySink) {
    let sink = MemorySink::new();
    let server = ProxyServer::new(config, Arc::new(sink.clone()));
    let handle = server.start().await.expect("proxy should start");
    (handle, sink)
}

pub fn proxy_url(handle: &ProxyHandle, path_and_query: &str) -> String {
    format!("http://{}{}", handle.local_addr(), path_and_query)
}

/// Client that sees bodies exactly as the proxy sent them (no decoding).
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .no_gzip()
        .no_brotli()
        .no_deflate()
        .no_zstd()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

pub fn method(name: &str) -> reqwest::Method {
    reqwest::Method::from_bytes(name.as_bytes()).unwrap()
}

/// Poll `check` every 10ms until it holds or `timeout` elapses.
pub async fn eventually(timeout: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
