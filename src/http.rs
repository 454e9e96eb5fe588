//! HTTP client for public JSON APIs
//!
//! This module is the only place that touches the network. It provides:
//! - A pooled reqwest client with keepalive and a fixed user agent
//! - Classification of transport errors into [`CallFailure`]s
//! - [`HttpResponse`] helpers to judge the status and decode JSON bodies
//!
//! Timeouts per attempt are owned by the retry executor, which cancels the
//! request future; the client-level timeout here is only a backstop.

use anyhow::{Context, Result};
use reqwest::{Client, ClientBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::outcome::{CallFailure, CallOutcome};

/// Status code and body of a completed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    /// Turns a non-2xx response into an `HttpStatus` failure
    ///
    /// 429 and 5xx are logged as transient since the retry predicate will
    /// usually try again; other client errors are final.
    pub fn error_for_status(self) -> CallOutcome<Self> {
        if self.is_success() {
            return Ok(self);
        }

        let failure = CallFailure::http_status(self.status);
        if failure.is_transient() {
            warn!("Transient HTTP status {}", self.status);
        } else {
            info!("Non-retriable HTTP status {}", self.status);
        }
        Err(failure)
    }

    /// Decodes the body as JSON
    ///
    /// # Examples
    ///
    /// ```
    /// use resilient_fetch::http::HttpResponse;
    ///
    /// let response = HttpResponse { status: 200, body: r#"{"name":"Rick"}"#.to_string() };
    /// let value: serde_json::Value = response.json().unwrap();
    /// assert_eq!(value["name"], "Rick");
    /// ```
    pub fn json<T: DeserializeOwned>(&self) -> CallOutcome<T> {
        serde_json::from_str(&self.body)
            .map_err(|e| CallFailure::invalid_body(format!("failed to decode JSON body: {}", e)))
    }
}

/// Pooled HTTP client that classifies every failure
///
/// # Examples
///
/// ```no_run
/// use resilient_fetch::http::HttpClient;
/// use std::time::Duration;
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = HttpClient::new(Duration::from_secs(30))?;
/// let response = client
///     .perform_request("https://rickandmortyapi.com/api/character/1")
///     .await?;
/// println!("{} bytes", response.body.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a client with connection pooling and TCP keepalive
    ///
    /// # Arguments
    /// * `timeout` - Backstop timeout for a whole request
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .user_agent(concat!("resilient-fetch/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Issues a GET request and reads the full body
    ///
    /// Any status is returned as a response; only transport problems are
    /// failures here. Use [`HttpResponse::error_for_status`] to judge it.
    pub async fn perform_request(&self, url: &str) -> CallOutcome<HttpResponse> {
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify_transport_error)?;

        debug!("GET {} -> {} ({} bytes)", url, status, body.len());
        Ok(HttpResponse { status, body })
    }
}

fn classify_transport_error(err: reqwest::Error) -> CallFailure {
    if err.is_timeout() {
        CallFailure::timeout(err.to_string())
    } else if err.is_decode() {
        CallFailure::invalid_body(err.to_string())
    } else {
        CallFailure::network(err.to_string())
    }
}
