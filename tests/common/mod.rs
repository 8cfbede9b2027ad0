//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use failover_bench::config::{BenchConfig, LocatorMode, StorageBackend};

pub const NODE: &str = "/namenode";

/// Config with millisecond waits so failover scenarios finish quickly.
pub fn fast_config() -> BenchConfig {
    let mut config = BenchConfig::default();
    config.mode = LocatorMode::Ha;
    config.storage.backend = StorageBackend::Memory;
    config.storage.primary = "fallback:1".to_string();
    config.storage.block_size = 64 * 1024;
    config.coordination.connect_string = "memory".to_string();
    config.coordination.path = NODE.to_string();
    config.coordination.reconnect_base_ms = 10;
    config.coordination.reconnect_max_ms = 50;
    config.coordination.ready_timeout_secs = 2;
    config.retry.failover_complete_wait_ms = 5;
    config.retry.failover_complete_jitter_ms = 0;
    config.retry.regular_error_wait_ms = 10;
    config.retry.failover_in_progress_wait_secs = 10;
    config.cleanup.close_timeout_ms = 1000;
    config.workload.hostname = Some("itest".to_string());
    config.workload.files = 1;
    config.workload.blocks = 1;
    config
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// A request seen by the mock server: method and request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenRequest {
    pub method: String,
    pub target: String,
}

/// Canned response from the mock server.
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Advertised length when it exceeds `body`; the connection then hangs.
    pub declared_len: Option<usize>,
}

impl MockResponse {
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: body.as_bytes().to_vec(),
            declared_len: None,
        }
    }

    pub fn bytes(status: u16, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body,
            declared_len: None,
        }
    }

    /// Send the head and `sent`, then go silent with the socket open.
    pub fn stalled(status: u16, declared_len: usize, sent: Vec<u8>) -> Self {
        Self {
            declared_len: Some(declared_len),
            ..Self::bytes(status, sent)
        }
    }
}

/// Start a programmable HTTP server for body-less requests.
///
/// Returns the bound address and the log of requests it received.
pub async fn start_programmable_backend<F, Fut>(f: F) -> (SocketAddr, Arc<Mutex<Vec<SeenRequest>>>)
where
    F: Fn(SeenRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockResponse> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let f = f.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                let text = String::from_utf8_lossy(&head);
                let mut parts = text.lines().next().unwrap_or_default().split_whitespace();
                let request = SeenRequest {
                    method: parts.next().unwrap_or_default().to_string(),
                    target: parts.next().unwrap_or_default().to_string(),
                };
                log.lock().unwrap().push(request.clone());

                let response = f(request).await;
                let status_text = match response.status {
                    200 => "200 OK",
                    201 => "201 Created",
                    307 => "307 Temporary Redirect",
                    403 => "403 Forbidden",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    _ => "200 OK",
                };
                let mut out = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n",
                    status_text,
                    response.declared_len.unwrap_or(response.body.len())
                );
                for (name, value) in &response.headers {
                    out.push_str(&format!("{name}: {value}\r\n"));
                }
                out.push_str("\r\n");
                let _ = socket.write_all(out.as_bytes()).await;
                let _ = socket.write_all(&response.body).await;
                if response.declared_len.is_some_and(|len| len > response.body.len()) {
                    let _ = socket.flush().await;
                    std::future::pending::<()>().await;
                }
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, seen)
}
