//! Breaker-guarded, retrying HTTP calls
//!
//! Wires the pieces together in the one order that makes sense: the
//! dependency's breaker decides admission first, then the retry executor
//! runs the request with per-attempt timeouts. The breaker sees one outcome
//! per logical request, however many attempts it took.

use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::circuit_breaker::CircuitBreaker;
use crate::http::{HttpClient, HttpResponse};
use crate::outcome::CallOutcome;
use crate::registry::BreakerRegistry;
use crate::retry::{RetryConfig, RetryExecutor};

/// HTTP client with a retry policy and per-dependency circuit breakers
///
/// # Examples
///
/// ```no_run
/// use resilient_fetch::circuit_breaker::CircuitBreakerConfig;
/// use resilient_fetch::client::ResilientClient;
/// use resilient_fetch::http::HttpClient;
/// use resilient_fetch::registry::BreakerRegistry;
/// use resilient_fetch::retry::RetryConfig;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = ResilientClient::new(
///     HttpClient::new(Duration::from_secs(30))?,
///     RetryConfig::default(),
///     Arc::new(BreakerRegistry::new(CircuitBreakerConfig::default())),
/// );
///
/// let character: serde_json::Value = client
///     .get_json("rickandmortyapi.com/character", "https://rickandmortyapi.com/api/character/1")
///     .await?;
/// println!("{}", character["name"]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ResilientClient {
    http: HttpClient,
    retry: RetryExecutor,
    breakers: Arc<BreakerRegistry>,
}

impl ResilientClient {
    pub fn new(http: HttpClient, retry_config: RetryConfig, breakers: Arc<BreakerRegistry>) -> Self {
        Self {
            http,
            retry: RetryExecutor::new(retry_config),
            breakers,
        }
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    pub fn retry_config(&self) -> &RetryConfig {
        self.retry.config()
    }

    /// GETs `url` through `dependency`'s breaker, retrying unhealthy statuses
    pub async fn get(&self, dependency: &str, url: &str) -> CallOutcome<HttpResponse> {
        let breaker = self.breakers.get_or_create(dependency);
        self.get_with(&breaker, url).await
    }

    /// Same as [`get`](Self::get) but against a breaker the caller holds
    pub async fn get_with(&self, breaker: &CircuitBreaker, url: &str) -> CallOutcome<HttpResponse> {
        breaker
            .exec(|| {
                self.retry.execute(|| async {
                    self.http.perform_request(url).await?.error_for_status()
                })
            })
            .await
    }

    /// GETs `url` and decodes the body as JSON
    ///
    /// A body that fails to decode is reported as `InvalidBody` but does not
    /// count against the breaker: the dependency itself answered.
    pub async fn get_json<T: DeserializeOwned>(&self, dependency: &str, url: &str) -> CallOutcome<T> {
        self.get(dependency, url).await?.json()
    }
}
