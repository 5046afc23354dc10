//! Per-provider circuit breaker.
//!
//! Each [`Aggregator`](crate::orchestrator::aggregate::Aggregator) owns one
//! breaker. A provider that fails `failure_threshold` aggregations in a row
//! is skipped (not dispatched, not charged) until `cooldown_secs` have
//! passed, after which a single trial dispatch decides whether it recovers.
//!
//! ```text
//! ┌────────┐  N failures   ┌────────┐  cooldown   ┌──────────┐
//! │ Closed ├──────────────►│  Open  ├────────────►│ HalfOpen │
//! └───▲────┘               └───▲────┘             └────┬─────┘
//!     │        success         │      failure          │
//!     └────────────────────────┴───────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

use crate::types::Provider;

/// Circuit state for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Healthy; dispatched normally.
    Closed,
    /// Tripped; skipped until the cooldown expires.
    Open,
    /// Cooldown expired; the next dispatch is a trial.
    HalfOpen,
}

#[derive(Debug, Clone)]
struct ProviderHealth {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
        }
    }
}

/// Thresholds for tripping and recovering a provider circuit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Seconds an open circuit stays open before a trial dispatch.
    pub cooldown_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_secs: 60,
        }
    }
}

/// Snapshot of one provider's health, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderHealthReport {
    pub provider: Provider,
    pub state: CircuitState,
    pub consecutive_failures: u32,
}

/// Tracks provider health and decides which providers may be dispatched.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    providers: HashMap<Provider, ProviderHealth>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            providers: HashMap::new(),
        }
    }

    /// A successful page closes the circuit and clears the failure count.
    pub fn record_success(&mut self, provider: Provider) {
        let health = self.providers.entry(provider).or_default();
        health.state = CircuitState::Closed;
        health.consecutive_failures = 0;
        health.opened_at = None;
    }

    /// A failed page counts towards the threshold. A failed trial in
    /// `HalfOpen` re-opens immediately.
    pub fn record_failure(&mut self, provider: Provider) {
        let threshold = self.config.failure_threshold;
        let health = self.providers.entry(provider).or_default();
        health.consecutive_failures = health.consecutive_failures.saturating_add(1);

        if health.state == CircuitState::HalfOpen || health.consecutive_failures >= threshold {
            health.state = CircuitState::Open;
            health.opened_at = Some(Instant::now());
        }
    }

    /// Whether `provider` may be dispatched now. Moves an expired `Open`
    /// circuit to `HalfOpen`.
    pub fn should_attempt(&mut self, provider: Provider) -> bool {
        let cooldown = self.config.cooldown_secs;
        let health = self.providers.entry(provider).or_default();

        match health.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let expired = health
                    .opened_at
                    .is_none_or(|t| t.elapsed().as_secs() >= cooldown);
                if expired {
                    health.state = CircuitState::HalfOpen;
                }
                expired
            }
        }
    }

    /// Split `providers` into those that may be dispatched and those
    /// whose circuit is open. Order is preserved in both halves.
    pub fn partition(&mut self, providers: &[Provider]) -> (Vec<Provider>, Vec<Provider>) {
        providers
            .iter()
            .copied()
            .partition(|p| self.should_attempt(*p))
    }

    /// Current state for `provider`; unseen providers are `Closed`.
    pub fn status(&self, provider: Provider) -> CircuitState {
        self.providers
            .get(&provider)
            .map_or(CircuitState::Closed, |h| h.state)
    }

    /// Health of every provider seen so far, sorted by provider.
    pub fn health_report(&self) -> Vec<ProviderHealthReport> {
        let mut report: Vec<ProviderHealthReport> = self
            .providers
            .iter()
            .map(|(provider, health)| ProviderHealthReport {
                provider: *provider,
                state: health.state,
                consecutive_failures: health.consecutive_failures,
            })
            .collect();
        report.sort_by_key(|r| r.provider);
        report
    }

    /// Forget all health history.
    pub fn reset(&mut self) {
        self.providers.clear();
    }
}
