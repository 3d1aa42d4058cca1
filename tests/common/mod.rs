//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use slack_gate::config::GatewayConfig;
use slack_gate::lifecycle::{startup, RunningGateway, Shutdown};
use slack_gate::security::signature::{sign, SIGNATURE_HEADER, TIMESTAMP_HEADER};

pub const SECRET: &str = "integration-secret";

/// Raw-socket upstream that answers every request with the request itself.
///
/// The response body is the request head as received, a blank line, then
/// the request body.
pub struct EchoUpstream {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl EchoUpstream {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Start an echoing upstream on an ephemeral port.
pub async fn start_echo_upstream(status: u16) -> EchoUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let counter = counter.clone();
            tokio::spawn(echo(socket, status, counter));
        }
    });

    EchoUpstream { addr, hits }
}

/// Start an upstream that accepts connections and never answers.
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

async fn echo(mut socket: TcpStream, status: u16, hits: Arc<AtomicUsize>) -> Option<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    hits.fetch_add(1, Ordering::SeqCst);
    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let body_start = head_end + 4;
    while buf.len() < body_start + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let mut echo = head.into_bytes();
    echo.extend_from_slice(b"\r\n\r\n");
    echo.extend_from_slice(&buf[body_start..]);

    let response = format!(
        "HTTP/1.1 {} Echo\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        echo.len()
    );
    socket.write_all(response.as_bytes()).await.ok()?;
    socket.write_all(&echo).await.ok()?;
    let _ = socket.shutdown().await;
    Some(())
}

/// Minimal valid configuration pointing at `upstream`.
pub fn gateway_config(upstream: SocketAddr) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.addresses = vec!["127.0.0.1:0".to_string()];
    config.upstream.target = format!("http://{}", upstream);
    config.signature.signing_secret = SECRET.to_string();
    config
}

/// A running gateway. Dropping it shuts the listeners down.
pub struct TestGateway {
    pub addrs: Vec<SocketAddr>,
    shutdown: Shutdown,
    running: Option<RunningGateway>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addrs[0], path)
    }

    pub async fn stop(mut self) {
        self.shutdown.trigger();
        if let Some(running) = self.running.take() {
            running.wait().await.unwrap();
        }
    }
}

pub async fn start_gateway(config: GatewayConfig) -> TestGateway {
    let shutdown = Shutdown::new();
    let running = startup::start(config, &shutdown).await.unwrap();
    TestGateway {
        addrs: running.addresses().to_vec(),
        shutdown,
        running: Some(running),
    }
}

pub fn now() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
        .to_string()
}

/// Client that never pools, so every request opens a fresh connection.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// A POST carrying a valid signature for `body`.
pub fn signed_post(client: &reqwest::Client, url: &str, body: &'static str) -> reqwest::RequestBuilder {
    let ts = now();
    client
        .post(url)
        .header(TIMESTAMP_HEADER, &ts)
        .header(SIGNATURE_HEADER, sign(SECRET.as_bytes(), &ts, body.as_bytes()).unwrap())
        .body(body)
}
