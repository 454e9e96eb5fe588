//! Up-front checks for retry and breaker settings and for target URLs
//!
//! Everything here runs before any request is made, so a bad flag or a
//! malformed URL is reported once instead of surfacing as a call failure.

use reqwest::Url;
use std::time::Duration;
use thiserror::Error;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::retry::RetryConfig;

/// Rejected configuration or input
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("max delay ({max:?}) must not be shorter than base delay ({base:?})")]
    DelayCapBelowBase { base: Duration, max: Duration },

    #[error("jitter must be within [0, 1], got {0}")]
    JitterOutOfRange(f64),

    #[error("attempt timeout must be non-zero")]
    ZeroTimeout,

    #[error("{0} must be positive")]
    NonPositive(&'static str),

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Checks the invariants of a retry policy
///
/// - `max_delay >= base_delay`
/// - `jitter` within `[0, 1]`
/// - a non-zero per-attempt timeout
pub fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_delay < config.base_delay {
        return Err(ConfigError::DelayCapBelowBase {
            base: config.base_delay,
            max: config.max_delay,
        });
    }

    if !(0.0..=1.0).contains(&config.jitter) {
        return Err(ConfigError::JitterOutOfRange(config.jitter));
    }

    if config.timeout.is_zero() {
        return Err(ConfigError::ZeroTimeout);
    }

    Ok(())
}

/// Checks that every breaker threshold and the cooldown are positive
pub fn validate_breaker_config(config: &CircuitBreakerConfig) -> Result<(), ConfigError> {
    if config.failure_threshold == 0 {
        return Err(ConfigError::NonPositive("failure threshold"));
    }
    if config.success_threshold == 0 {
        return Err(ConfigError::NonPositive("success threshold"));
    }
    if config.open_duration.is_zero() {
        return Err(ConfigError::NonPositive("open duration"));
    }
    Ok(())
}

/// Parses an absolute http(s) URL with a host
pub fn validate_url(url: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let parsed = Url::parse(url).map_err(|e| invalid(&e.to_string()))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host"));
    }

    Ok(parsed)
}
