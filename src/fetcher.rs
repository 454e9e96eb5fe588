//! Application call sites: detail, collection and batch fetches
//!
//! These are the callers the resilience layer exists for. They never fail
//! on a dependency outage; every fetch degrades into a result that says what
//! went wrong so the caller can render something (or nothing) instead of
//! crashing:
//!
//! - [`Fetcher::fetch`] returns a [`FetchResult`] carrying the body or a
//!   classified error, flagged `degraded` when the breaker blocked the call
//! - [`Fetcher::fetch_collection`] returns the `results` array of a list
//!   response, or an empty list
//! - [`Fetcher::process_batch`] streams URLs from a file and writes one JSON
//!   result per line
//!
//! Each URL is routed to a breaker keyed by its dependency (host plus
//! resource name), so an outage of one resource never throttles another.

use anyhow::{Context, Result};
use futures::{stream, StreamExt};
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
};
use tracing::{debug, error, info, warn};

use crate::client::ResilientClient;
use crate::outcome::{CallFailure, FailureKind};
use crate::validation::{validate_url, ConfigError};

/// Outcome of fetching one URL
///
/// # Examples
///
/// ```
/// use resilient_fetch::fetcher::FetchResult;
///
/// let degraded = FetchResult {
///     url: "https://rickandmortyapi.com/api/episode/1".to_string(),
///     dependency: "rickandmortyapi.com/episode".to_string(),
///     status: None,
///     body: None,
///     processing_time_ms: 0,
///     error: Some("circuit open: calls to 'rickandmortyapi.com/episode' are temporarily blocked".to_string()),
///     failure: None,
///     degraded: true,
/// };
/// assert!(!degraded.is_success());
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub url: String,
    /// Breaker key the URL was routed through, empty for a rejected URL
    pub dependency: String,
    /// HTTP status of the final attempt, when one completed
    pub status: Option<u16>,
    pub body: Option<Value>,
    pub processing_time_ms: u64,
    pub error: Option<String>,
    /// Classification of `error`, set exactly when `error` is
    pub failure: Option<FailureKind>,
    /// True when the breaker rejected the call without touching the network
    pub degraded: bool,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn failed(url: &str, dependency: String, failure: &CallFailure, start: Instant) -> Self {
        let status = match failure.kind() {
            FailureKind::HttpStatus(code) => Some(code),
            _ => None,
        };
        Self {
            url: url.to_string(),
            dependency,
            status,
            body: None,
            processing_time_ms: start.elapsed().as_millis() as u64,
            error: Some(failure.to_string()),
            failure: Some(failure.kind()),
            degraded: failure.kind() == FailureKind::CircuitOpen,
        }
    }
}

/// Derives the breaker key for a URL: `host[:port]/resource`
///
/// The resource is the first path segment, skipping a leading `api`
/// segment, so `https://rickandmortyapi.com/api/character/2` and
/// `https://rickandmortyapi.com/api/character/?page=3` share
/// `rickandmortyapi.com/character`.
///
/// # Examples
///
/// ```
/// use resilient_fetch::fetcher::dependency_for;
/// use reqwest::Url;
///
/// let url = Url::parse("https://rickandmortyapi.com/api/location/3").unwrap();
/// assert_eq!(dependency_for(&url), "rickandmortyapi.com/location");
/// ```
pub fn dependency_for(url: &Url) -> String {
    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    };
    let resource = url
        .path_segments()
        .and_then(|mut segments| {
            segments.find(|s| !s.is_empty() && !s.eq_ignore_ascii_case("api"))
        })
        .unwrap_or("");

    if resource.is_empty() {
        host
    } else {
        format!("{}/{}", host, resource)
    }
}

/// Fetches JSON resources through a [`ResilientClient`]
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: ResilientClient,
    concurrent_limit: usize,
}

impl Fetcher {
    /// # Arguments
    /// * `client` - Breaker-guarded client every fetch goes through
    /// * `concurrent_requests` - Maximum fetches in flight during a batch
    pub fn new(client: ResilientClient, concurrent_requests: usize) -> Self {
        Self {
            client,
            concurrent_limit: concurrent_requests.max(1),
        }
    }

    pub fn client(&self) -> &ResilientClient {
        &self.client
    }

    /// Fetches one URL; never fails
    pub async fn fetch(&self, url: &str) -> FetchResult {
        let start = Instant::now();
        debug!("Fetching {}", url);

        let parsed = match validate_url(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!("Rejected URL {}: {}", url, e);
                let failure = match e {
                    ConfigError::InvalidUrl { reason, .. } => CallFailure::invalid_url(reason),
                    other => CallFailure::invalid_url(other.to_string()),
                };
                return FetchResult::failed(url, String::new(), &failure, start);
            }
        };
        let dependency = dependency_for(&parsed);

        let response = match self.client.get(&dependency, url).await {
            Ok(response) => response,
            Err(failure) => {
                if failure.kind() == FailureKind::CircuitOpen {
                    warn!("Service temporarily unavailable, skipped {}", url);
                } else {
                    error!("Failed to fetch {}: {}", url, failure);
                }
                return FetchResult::failed(url, dependency, &failure, start);
            }
        };

        match response.json::<Value>() {
            Ok(body) => FetchResult {
                url: url.to_string(),
                dependency,
                status: Some(response.status),
                body: Some(body),
                processing_time_ms: start.elapsed().as_millis() as u64,
                error: None,
                failure: None,
                degraded: false,
            },
            Err(failure) => {
                error!("Unreadable body from {}: {}", url, failure);
                let mut result = FetchResult::failed(url, dependency, &failure, start);
                result.status = Some(response.status);
                result
            }
        }
    }

    /// Fetches a list endpoint and returns its `results` array
    ///
    /// Any failure, including a body without a `results` array, yields an
    /// empty list.
    pub async fn fetch_collection(&self, url: &str) -> Vec<Value> {
        let result = self.fetch(url).await;

        match result.body {
            Some(Value::Object(mut map)) => match map.remove("results") {
                Some(Value::Array(items)) => items,
                _ => {
                    warn!("Response from {} has no results array", url);
                    Vec::new()
                }
            },
            Some(_) => {
                warn!("Response from {} is not a JSON object", url);
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    /// Fetches every URL listed in a file, writing JSON lines
    ///
    /// Blank lines and lines starting with `#` are skipped. URLs are read in
    /// chunks of `chunk_size` and each chunk is fetched concurrently; results
    /// go to `output_file` (one JSON object per line) or pretty-printed to
    /// stdout.
    ///
    /// # Returns
    /// * `Result<usize>` - Number of URLs processed
    pub async fn process_batch(
        &self,
        input_file: &Path,
        output_file: Option<&PathBuf>,
        chunk_size: usize,
    ) -> Result<usize> {
        let chunk_size = chunk_size.max(1);

        let mut output_writer = match output_file {
            Some(path) => Some(
                OpenOptions::new()
                    .create(true)
                    .truncate(true)
                    .write(true)
                    .open(path)
                    .await
                    .context("Failed to create output file")?,
            ),
            None => None,
        };

        let file = File::open(input_file)
            .await
            .with_context(|| format!("Failed to open URL file: {:?}", input_file))?;
        let mut reader = BufReader::with_capacity(64 * 1024, file);

        let mut processed = 0;
        let mut chunk = Vec::with_capacity(chunk_size);
        let mut line = String::new();

        info!("Processing URLs from {}", input_file.display());

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;
            let at_eof = bytes_read == 0;

            let url = line.trim();
            if !url.is_empty() && !url.starts_with('#') {
                chunk.push(url.to_string());
            }

            if chunk.len() >= chunk_size || (at_eof && !chunk.is_empty()) {
                info!("Processing chunk of {} URLs ({} done so far)", chunk.len(), processed);
                let results = self.process_chunk(&chunk).await;
                processed += results.len();

                for result in &results {
                    match output_writer.as_mut() {
                        Some(writer) => {
                            let json_line = format!("{}\n", serde_json::to_string(result)?);
                            writer.write_all(json_line.as_bytes()).await?;
                        }
                        None => println!("{}", serde_json::to_string_pretty(result)?),
                    }
                }
                if let Some(writer) = output_writer.as_mut() {
                    writer.flush().await?;
                }
                chunk.clear();
            }

            if at_eof {
                break;
            }
        }

        info!("Batch completed, processed {} URLs", processed);
        Ok(processed)
    }

    async fn process_chunk(&self, urls: &[String]) -> Vec<FetchResult> {
        stream::iter(urls)
            .map(|url| self.fetch(url))
            .buffer_unordered(self.concurrent_limit)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(url: &str) -> String {
        dependency_for(&Url::parse(url).unwrap())
    }

    #[test]
    fn test_dependency_skips_api_segment() {
        assert_eq!(
            dep("https://rickandmortyapi.com/api/character/?page=2"),
            "rickandmortyapi.com/character"
        );
        assert_eq!(
            dep("https://rickandmortyapi.com/api/episode/28"),
            "rickandmortyapi.com/episode"
        );
    }

    #[test]
    fn test_dependency_without_api_prefix() {
        assert_eq!(dep("http://127.0.0.1:8080/items/1"), "127.0.0.1:8080/items");
        assert_eq!(dep("https://example.com/"), "example.com");
        assert_eq!(dep("https://example.com/api"), "example.com");
    }
}
