//! Retry operations with exponential backoff, jitter and per-attempt timeouts
//!
//! This module provides the retry half of the resilient call path. Each
//! logical call is run up to `max_retries + 1` times with:
//!
//! - A hard timeout per attempt; an attempt that overruns is cancelled by
//!   dropping its future, which aborts the in-flight request
//! - Exponential delay between attempts, capped at `max_delay`
//! - Symmetric jitter to keep independent callers from retrying in lockstep
//! - A pluggable predicate deciding which failures are worth another attempt
//!
//! Attempts are strictly sequential: attempt `k + 1` never starts before
//! attempt `k` has settled or been cancelled.

use rand::Rng;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::outcome::{CallFailure, CallOutcome};

/// Predicate deciding whether a failed attempt should be retried
pub type RetryPredicate = Arc<dyn Fn(&CallFailure) -> bool + Send + Sync>;

/// Configuration for the exponential backoff retry strategy
///
/// The defaults mirror what the public API call sites have always used:
/// two retries, 250ms base delay doubling up to 2.5s, 20% jitter and a
/// seven second budget per attempt.
///
/// # Examples
///
/// ```
/// use resilient_fetch::retry::RetryConfig;
/// use std::time::Duration;
///
/// let config = RetryConfig::default()
///     .with_max_retries(4)
///     .with_base_delay(Duration::from_millis(100))
///     .with_jitter(0.0);
///
/// assert_eq!(config.max_retries, 4);
/// assert_eq!(config.backoff_delay(2), Duration::from_millis(400));
/// ```
#[derive(Clone)]
pub struct RetryConfig {
    /// Number of retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Upper bound on any single delay, jitter included
    pub max_delay: Duration,

    /// Jitter fraction in `[0, 1]`; the delay is scaled by a uniform
    /// factor in `[1 - jitter, 1 + jitter]`
    pub jitter: f64,

    /// Time budget for a single attempt
    pub timeout: Duration,

    /// Classifies failures as retryable
    pub should_retry: RetryPredicate,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_millis(2500),
            jitter: 0.2,
            timeout: Duration::from_millis(7000),
            should_retry: Arc::new(CallFailure::is_transient),
        }
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("jitter", &self.jitter)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replaces the retry predicate
    pub fn with_should_retry<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&CallFailure) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    /// Un-jittered delay after the failed attempt with index `attempt`
    /// (0-based): `min(max_delay, base_delay * 2^attempt)`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay actually slept after attempt `attempt`, jitter applied
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        apply_jitter(
            self.backoff_delay(attempt),
            self.jitter,
            self.max_delay,
            &mut rand::thread_rng(),
        )
    }
}

/// Scales `delay` by a uniform factor in `[1 - jitter, 1 + jitter]`.
///
/// The jitter fraction is clamped to `[0, 1]` so the factor never goes
/// negative, and the result never exceeds `cap`.
pub fn apply_jitter<R: Rng>(
    delay: Duration,
    jitter: f64,
    cap: Duration,
    rng: &mut R,
) -> Duration {
    let jitter = if jitter.is_finite() {
        jitter.clamp(0.0, 1.0)
    } else {
        0.0
    };
    if jitter == 0.0 || delay.is_zero() {
        return delay.min(cap);
    }

    let factor = rng.gen_range((1.0 - jitter)..=(1.0 + jitter));
    delay.mul_f64(factor.max(0.0)).min(cap)
}

/// Runs `operation` with timeout, retries and backoff per `config`
///
/// Returns the first success, or the last classified failure once the
/// failure is judged non-retryable or the retry budget is spent. A timed-out
/// attempt surfaces as [`FailureKind::Timeout`](crate::outcome::FailureKind::Timeout).
///
/// Only failures are offered to the retry predicate; an `Ok` value ends the
/// loop. An operation that receives an unhealthy response must return it as
/// an `HttpStatus` failure (see [`HttpResponse::error_for_status`](crate::http::HttpResponse::error_for_status))
/// for it to be retried.
///
/// # Examples
///
/// ```
/// use resilient_fetch::outcome::CallFailure;
/// use resilient_fetch::retry::{execute_with_retry, RetryConfig};
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() {
/// let config = RetryConfig::default().with_base_delay(Duration::from_millis(1));
///
/// let outcome = execute_with_retry(
///     || async { Err::<(), _>(CallFailure::http_status(404)) },
///     &config,
/// )
/// .await;
///
/// // 404 is not transient, so no retries were made
/// assert!(outcome.is_err());
/// # }
/// ```
pub async fn execute_with_retry<F, Fut, T>(mut operation: F, config: &RetryConfig) -> CallOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CallOutcome<T>>,
{
    let total_attempts = config.max_retries.saturating_add(1);
    let mut attempt = 0u32;

    loop {
        let outcome = match timeout(config.timeout, operation()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(CallFailure::timeout(format!(
                "attempt {} exceeded {:?}",
                attempt + 1,
                config.timeout
            ))),
        };

        let failure = match outcome {
            Ok(value) => {
                if attempt > 0 {
                    debug!("Attempt {}/{} succeeded", attempt + 1, total_attempts);
                }
                return Ok(value);
            }
            Err(failure) => failure,
        };

        if !(config.should_retry)(&failure) {
            debug!("Non-retryable failure on attempt {}: {}", attempt + 1, failure);
            return Err(failure);
        }

        if attempt >= config.max_retries {
            warn!(
                "Giving up after {} attempt(s), last failure: {}",
                total_attempts, failure
            );
            return Err(failure);
        }

        let delay = config.jittered_delay(attempt);
        debug!(
            "Attempt {}/{} failed ({}), retrying after {:?}",
            attempt + 1,
            total_attempts,
            failure,
            delay
        );
        sleep(delay).await;
        attempt += 1;
    }
}

/// A reusable retry policy bound to one call site
///
/// Thin owner of a [`RetryConfig`] so call sites can hold a policy by value
/// instead of threading the config through every call.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub async fn execute<F, Fut, T>(&self, operation: F) -> CallOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CallOutcome<T>>,
    {
        execute_with_retry(operation, &self.config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_backoff_doubles_until_capped() {
        let config = RetryConfig::default();

        assert_eq!(config.backoff_delay(0), Duration::from_millis(250));
        assert_eq!(config.backoff_delay(1), Duration::from_millis(500));
        assert_eq!(config.backoff_delay(2), Duration::from_millis(1000));
        assert_eq!(config.backoff_delay(3), Duration::from_millis(2000));
        assert_eq!(config.backoff_delay(4), Duration::from_millis(2500));
        assert_eq!(config.backoff_delay(40), Duration::from_millis(2500));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let base = Duration::from_millis(1000);
        let cap = Duration::from_millis(5000);

        for _ in 0..1000 {
            let delay = apply_jitter(base, 0.2, cap, &mut rng);
            assert!(delay >= Duration::from_millis(800), "{:?}", delay);
            assert!(delay <= Duration::from_millis(1200), "{:?}", delay);
        }
    }

    #[test]
    fn test_jitter_never_exceeds_cap() {
        let mut rng = StdRng::seed_from_u64(11);
        let cap = Duration::from_millis(2500);

        for _ in 0..1000 {
            let delay = apply_jitter(cap, 1.0, cap, &mut rng);
            assert!(delay <= cap);
        }
    }

    #[test]
    fn test_out_of_range_jitter_is_clamped() {
        let mut rng = StdRng::seed_from_u64(3);
        let base = Duration::from_millis(100);
        let cap = Duration::from_secs(1);

        assert_eq!(apply_jitter(base, -0.5, cap, &mut rng), base);
        assert_eq!(apply_jitter(base, f64::NAN, cap, &mut rng), base);
        for _ in 0..100 {
            assert!(apply_jitter(base, 3.0, cap, &mut rng) <= Duration::from_millis(200));
        }
    }
}
