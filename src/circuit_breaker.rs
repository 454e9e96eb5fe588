//! Circuit breaker guarding a single named dependency
//!
//! # States
//!
//! ```text
//! Closed ──[failure_threshold consecutive failures]──> Open
//!   ▲                                                   │
//!   │                                                   │ [open_duration elapsed,
//!   │                                                   │  next call admitted as probe]
//!   │                                                   ▼
//!   └──[success_threshold consecutive probe successes]─ HalfOpen
//!                        [any failure] ───────────────> Open
//! ```
//!
//! The breaker only sees the terminal outcome of whatever it wraps, so when
//! it wraps a retrying call a whole retry sequence counts as one failure.
//! While half-open at most one probe is in flight; concurrent callers are
//! rejected as if the breaker were open.

use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::outcome::{CallFailure, CallOutcome};

/// Mode of a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls flow through; consecutive failures are counted
    Closed,
    /// Calls are rejected without invoking the operation
    Open,
    /// A single probe at a time is let through to test recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Thresholds and cooldown for one dependency's breaker
///
/// Defaults: open after 4 consecutive failures, stay open 10 seconds, close
/// again after 2 consecutive successful probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures (while closed) that open the circuit
    pub failure_threshold: u32,
    /// Consecutive probe successes (while half-open) that close the circuit
    pub success_threshold: u32,
    /// How long the circuit stays open before a probe is allowed
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 4,
            success_threshold: 2,
            open_duration: Duration::from_secs(10),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn with_open_duration(mut self, duration: Duration) -> Self {
        self.open_duration = duration;
        self
    }
}

/// Point-in-time view of a breaker's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerStats {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub probe_in_flight: bool,
}

#[derive(Debug)]
struct BreakerState {
    mode: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    open_until: Option<Instant>,
    probe_in_flight: bool,
    // Bumped every time the circuit opens so a probe admitted in an earlier
    // half-open window cannot settle the current one.
    epoch: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            mode: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            open_until: None,
            probe_in_flight: false,
            epoch: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe { epoch: u64 },
}

/// Releases the half-open probe slot if the probe future is dropped before
/// it settles (e.g. the caller timed out).
struct ProbeSlot<'a> {
    breaker: &'a CircuitBreaker,
    epoch: u64,
    settled: bool,
}

impl Drop for ProbeSlot<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.breaker.lock_state();
        if state.epoch == self.epoch && state.probe_in_flight {
            debug!(
                "Probe for '{}' was cancelled, releasing probe slot",
                self.breaker.name
            );
            state.probe_in_flight = false;
        }
    }
}

/// Stateful gate in front of one dependency
///
/// Share it between every call site of that dependency (e.g. behind an
/// `Arc`); never share one breaker between unrelated dependencies, or one
/// failing service will throttle a healthy one.
///
/// # Examples
///
/// ```
/// use resilient_fetch::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
/// use resilient_fetch::outcome::CallFailure;
///
/// # #[tokio::main]
/// # async fn main() {
/// let breaker = CircuitBreaker::new(
///     "characters",
///     CircuitBreakerConfig::default().with_failure_threshold(1),
/// );
///
/// let first = breaker
///     .exec(|| async { Err::<(), _>(CallFailure::network("connection reset")) })
///     .await;
/// assert!(first.is_err());
/// assert_eq!(breaker.current_state(), CircuitState::Open);
///
/// // Rejected without running the closure
/// let second = breaker.exec(|| async { Ok::<_, CallFailure>(42) }).await;
/// assert!(second.is_err());
/// # }
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current mode, as last recorded. An open breaker whose cooldown has
    /// elapsed still reports `Open` until the next call probes it.
    pub fn current_state(&self) -> CircuitState {
        self.lock_state().mode
    }

    pub fn stats(&self) -> BreakerStats {
        let state = self.lock_state();
        BreakerStats {
            state: state.mode,
            consecutive_failures: state.consecutive_failures,
            consecutive_successes: state.consecutive_successes,
            probe_in_flight: state.probe_in_flight,
        }
    }

    /// Runs `operation` if the breaker admits it and records the outcome
    ///
    /// Rejected calls return a `CircuitOpen` failure and never invoke
    /// `operation`. Admitted calls return the operation's outcome unchanged.
    pub async fn exec<F, Fut, T>(&self, operation: F) -> CallOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CallOutcome<T>>,
    {
        let admission = match self.try_admit() {
            Some(admission) => admission,
            None => {
                debug!("Circuit for '{}' is open, failing fast", self.name);
                return Err(CallFailure::circuit_open(&self.name));
            }
        };

        let mut slot = match admission {
            Admission::Probe { epoch } => Some(ProbeSlot {
                breaker: self,
                epoch,
                settled: false,
            }),
            Admission::Normal => None,
        };

        let outcome = operation().await;

        if let Some(slot) = slot.as_mut() {
            slot.settled = true;
        }

        match &outcome {
            Ok(_) => self.on_success(admission),
            Err(failure) => self.on_failure(admission, failure),
        }

        outcome
    }

    fn lock_state(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit breaker '{}' mutex was poisoned, recovering", self.name);
            poisoned.into_inner()
        })
    }

    // Admission and the probe-in-flight mark happen under one lock so two
    // racing callers can never both become the probe.
    fn try_admit(&self) -> Option<Admission> {
        let mut state = self.lock_state();

        match state.mode {
            CircuitState::Closed => Some(Admission::Normal),
            CircuitState::Open => {
                let ready = state
                    .open_until
                    .map_or(true, |until| Instant::now() >= until);
                if !ready {
                    return None;
                }
                info!("Circuit for '{}' transitioning OPEN -> HALF_OPEN", self.name);
                state.mode = CircuitState::HalfOpen;
                state.consecutive_successes = 0;
                state.probe_in_flight = true;
                Some(Admission::Probe { epoch: state.epoch })
            }
            CircuitState::HalfOpen => {
                if state.probe_in_flight {
                    return None;
                }
                state.probe_in_flight = true;
                Some(Admission::Probe { epoch: state.epoch })
            }
        }
    }

    fn on_success(&self, admission: Admission) {
        let mut state = self.lock_state();

        match state.mode {
            CircuitState::Closed => {
                state.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                let Admission::Probe { epoch } = admission else {
                    // A call admitted while closed that settled after the
                    // circuit moved on says nothing about recovery.
                    return;
                };
                if epoch != state.epoch {
                    return;
                }
                state.probe_in_flight = false;
                state.consecutive_successes += 1;
                debug!(
                    "Probe for '{}' succeeded ({}/{})",
                    self.name, state.consecutive_successes, self.config.success_threshold
                );
                if state.consecutive_successes >= self.config.success_threshold {
                    info!("Circuit for '{}' transitioning HALF_OPEN -> CLOSED", self.name);
                    state.mode = CircuitState::Closed;
                    state.consecutive_failures = 0;
                    state.consecutive_successes = 0;
                    state.open_until = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, admission: Admission, failure: &CallFailure) {
        let mut state = self.lock_state();

        match state.mode {
            CircuitState::Closed => {
                state.consecutive_failures += 1;
                debug!(
                    "Call to '{}' failed ({}/{}): {}",
                    self.name, state.consecutive_failures, self.config.failure_threshold, failure
                );
                if state.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        "Circuit for '{}' transitioning CLOSED -> OPEN for {:?}",
                        self.name, self.config.open_duration
                    );
                    self.trip(&mut state);
                }
            }
            CircuitState::HalfOpen => {
                if let Admission::Probe { epoch } = admission {
                    if epoch != state.epoch {
                        return;
                    }
                }
                warn!(
                    "Call to '{}' failed while HALF_OPEN, reopening for {:?}: {}",
                    self.name, self.config.open_duration, failure
                );
                state.consecutive_failures = 0;
                state.consecutive_successes = 0;
                self.trip(&mut state);
            }
            CircuitState::Open => {}
        }
    }

    fn trip(&self, state: &mut BreakerState) {
        state.mode = CircuitState::Open;
        state.open_until = Some(Instant::now() + self.config.open_duration);
        state.probe_in_flight = false;
        state.epoch += 1;
    }
}
