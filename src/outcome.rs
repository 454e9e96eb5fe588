//! Classified call outcomes shared by the retry executor and circuit breaker
//!
//! Every failure produced anywhere in the call path is normalized into a
//! [`CallFailure`] so that callers only ever match on one shape:
//!
//! - `Timeout` - an attempt exceeded its time budget and was cancelled
//! - `Network` - transport-level failure (DNS, connection reset, TLS)
//! - `HttpStatus` - a response arrived but its status was judged unhealthy
//! - `CircuitOpen` - the breaker rejected the call without touching the network
//! - `InvalidBody` - a response arrived but its body could not be decoded
//! - `InvalidUrl` - the target was rejected before any request was built

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result of one logical call: the operation's value or a classified failure.
pub type CallOutcome<T> = Result<T, CallFailure>;

/// Classification of a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "status", rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Network,
    HttpStatus(u16),
    CircuitOpen,
    InvalidBody,
    InvalidUrl,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Network => write!(f, "network error"),
            Self::HttpStatus(code) => write!(f, "HTTP {}", code),
            Self::CircuitOpen => write!(f, "circuit open"),
            Self::InvalidBody => write!(f, "invalid body"),
            Self::InvalidUrl => write!(f, "invalid URL"),
        }
    }
}

/// A failed call with its classification and a human-readable detail
///
/// # Examples
///
/// ```
/// use resilient_fetch::outcome::{CallFailure, FailureKind};
///
/// let failure = CallFailure::http_status(503);
/// assert_eq!(failure.kind(), FailureKind::HttpStatus(503));
/// assert!(failure.is_transient());
/// assert!(!CallFailure::http_status(404).is_transient());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct CallFailure {
    kind: FailureKind,
    detail: String,
}

impl CallFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, detail)
    }

    pub fn network(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Network, detail)
    }

    pub fn http_status(code: u16) -> Self {
        Self::new(
            FailureKind::HttpStatus(code),
            format!("request failed with status {}", code),
        )
    }

    pub fn circuit_open(dependency: &str) -> Self {
        Self::new(
            FailureKind::CircuitOpen,
            format!("calls to '{}' are temporarily blocked", dependency),
        )
    }

    pub fn invalid_body(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidBody, detail)
    }

    pub fn invalid_url(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidUrl, detail)
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// Whether the failure is worth another attempt.
    ///
    /// Timeouts, transport errors, 429 and 5xx are transient. Everything else,
    /// including `CircuitOpen`, is terminal: an open breaker is decided before
    /// any retry loop starts and must not be hammered from inside one.
    pub fn is_transient(&self) -> bool {
        match self.kind {
            FailureKind::Timeout | FailureKind::Network => true,
            FailureKind::HttpStatus(code) => code == 429 || (500..=599).contains(&code),
            FailureKind::CircuitOpen | FailureKind::InvalidBody | FailureKind::InvalidUrl => false,
        }
    }
}
