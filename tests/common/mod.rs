//! Shared utilities for integration tests.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use resilient_fetch::circuit_breaker::CircuitBreakerConfig;
use resilient_fetch::client::ResilientClient;
use resilient_fetch::http::HttpClient;
use resilient_fetch::registry::BreakerRegistry;
use resilient_fetch::retry::RetryConfig;

/// A running mock backend and the number of requests it has answered.
pub struct MockBackend {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicU32>,
}

#[allow(dead_code)]
impl MockBackend {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hit_count(&self) -> u32 {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Start a programmable mock backend on an ephemeral port.
///
/// `f` receives the 0-based index of the request and returns the status
/// and body to answer with.
#[allow(dead_code)]
pub async fn start_programmable_backend<F, Fut>(f: F) -> MockBackend
where
    F: Fn(u32) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicU32::new(0));
    let f = Arc::new(f);

    let counter = hits.clone();
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => break,
            };
            let f = f.clone();
            let counter = counter.clone();
            tokio::spawn(async move {
                // Drain the request head before answering so closing the
                // socket never resets the client mid-write.
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                    if request.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }

                let index = counter.fetch_add(1, Ordering::SeqCst);
                let (status, body) = f(index).await;
                let status_text = match status {
                    200 => "200 OK",
                    404 => "404 Not Found",
                    429 => "429 Too Many Requests",
                    500 => "500 Internal Server Error",
                    502 => "502 Bad Gateway",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };

                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    MockBackend { addr, hits }
}

/// Start a mock backend that always answers with the same response.
#[allow(dead_code)]
pub async fn start_mock_backend(status: u16, body: &'static str) -> MockBackend {
    start_programmable_backend(move |_| async move { (status, body.to_string()) }).await
}

/// Retry policy with short, deterministic delays for real-time tests.
#[allow(dead_code)]
pub fn fast_retry_config() -> RetryConfig {
    RetryConfig::default()
        .with_base_delay(Duration::from_millis(10))
        .with_max_delay(Duration::from_millis(50))
        .with_jitter(0.0)
        .with_timeout(Duration::from_secs(2))
}

/// Resilient client over a fresh registry.
#[allow(dead_code)]
pub fn test_client(retry: RetryConfig, breaker: CircuitBreakerConfig) -> ResilientClient {
    let http = HttpClient::new(Duration::from_secs(5)).unwrap();
    ResilientClient::new(http, retry, Arc::new(BreakerRegistry::new(breaker)))
}
