//! One circuit breaker per dependency
//!
//! Breakers are created lazily on first use and live as long as the
//! registry. Dependencies with known different tolerances can be given their
//! own config up front; everything else gets the registry default.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::circuit_breaker::{BreakerStats, CircuitBreaker, CircuitBreakerConfig, CircuitState};

/// Snapshot entry for one dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyHealth {
    pub dependency: String,
    #[serde(flatten)]
    pub stats: BreakerStats,
}

/// Independent, independently configured breakers keyed by dependency name
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    overrides: DashMap<String, CircuitBreakerConfig>,
    default_config: CircuitBreakerConfig,
}

impl BreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            overrides: DashMap::new(),
            default_config,
        }
    }

    /// Sets the config used when `dependency`'s breaker is first created
    ///
    /// Has no effect on a breaker that already exists.
    pub fn configure(&self, dependency: impl Into<String>, config: CircuitBreakerConfig) -> &Self {
        self.overrides.insert(dependency.into(), config);
        self
    }

    /// Returns the breaker for `dependency`, creating it if needed
    pub fn get_or_create(&self, dependency: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(dependency) {
            return Arc::clone(breaker.value());
        }

        self.breakers
            .entry(dependency.to_string())
            .or_insert_with(|| {
                let config = self
                    .overrides
                    .get(dependency)
                    .map(|c| *c.value())
                    .unwrap_or(self.default_config);
                debug!("Creating circuit breaker for '{}': {:?}", dependency, config);
                Arc::new(CircuitBreaker::new(dependency, config))
            })
            .value()
            .clone()
    }

    /// State of `dependency`'s breaker; unknown dependencies are closed
    pub fn state_of(&self, dependency: &str) -> CircuitState {
        self.breakers
            .get(dependency)
            .map(|b| b.current_state())
            .unwrap_or(CircuitState::Closed)
    }

    /// Every known dependency's state and counters, sorted by name
    pub fn snapshot(&self) -> Vec<DependencyHealth> {
        let mut health: Vec<DependencyHealth> = self
            .breakers
            .iter()
            .map(|entry| DependencyHealth {
                dependency: entry.key().clone(),
                stats: entry.value().stats(),
            })
            .collect();
        health.sort_by(|a, b| a.dependency.cmp(&b.dependency));
        health
    }
}
