//! Search configuration with sensible defaults.
//!
//! [`SearchConfig`] controls which providers are queried and in what
//! priority, timeouts and retries, merge policy, domain lists and caching.
//! It is built once at start-up and passed into the
//! [`Aggregator`](crate::orchestrator::aggregate::Aggregator); nothing in
//! this crate reads configuration from global state.

use serde::{Deserialize, Serialize};

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::domains::{default_excluded_domains, default_premium_domains};
use crate::error::SearchError;
use crate::types::Provider;

/// Default result cache lifetime: 30 days. Result content is effectively
/// static per query.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Upper bound on `cache_ttl_seconds`: ten years.
pub const MAX_CACHE_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// How to choose the displayed title/snippet when providers disagree
/// about the same canonical URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitlePolicy {
    /// Keep the pair from the observation with the highest confidence.
    /// Ties keep the higher-priority provider's pair.
    #[default]
    HighestConfidence,
    /// Always keep the pair from the highest-priority provider.
    FirstByPriority,
    /// Keep the pair with the longest snippet.
    LongestSnippet,
}

/// Configuration for a document search.
///
/// Use [`Default::default()`] for sensible defaults, or construct with
/// field overrides for custom behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Providers to query, in priority order. Earlier providers win
    /// ordering ties and title ties.
    pub providers: Vec<Provider>,
    /// Maximum number of merged results returned per aggregation.
    pub max_results: usize,
    /// Per-provider request timeout in seconds. A provider that exceeds
    /// it is abandoned and counted as failed.
    pub timeout_seconds: u64,
    /// Retries on transient failures (HTTP 429, 5xx, timeouts).
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries.
    pub retry_base_delay_ms: u64,
    /// Merged results below this document confidence are dropped.
    pub min_confidence: f64,
    /// Observations at or above this confidence are classified `free`.
    pub free_confidence_threshold: f64,
    /// Collision policy for title and snippet.
    pub title_policy: TitlePolicy,
    /// Document-sharing platforms whose results are classified `premium`.
    pub premium_domains: Vec<String>,
    /// Domains whose results are always dropped.
    pub excluded_domains: Vec<String>,
    /// How long to cache results in seconds. Set to 0 to disable caching.
    pub cache_ttl_seconds: u64,
    /// Maximum number of cached result sets.
    pub cache_capacity: u64,
    /// Provider health tracking.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Country code passed to providers that support it (`us`, `de`, ...).
    pub country: Option<String>,
    /// Interface/search language passed to providers that support it.
    pub language: Option<String>,
    /// Custom User-Agent string. If `None`, rotates through a built-in list
    /// of realistic browser User-Agents.
    pub user_agent: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            providers: Provider::all().to_vec(),
            max_results: 100,
            timeout_seconds: 15,
            max_retries: 2,
            retry_base_delay_ms: 250,
            min_confidence: 0.1,
            free_confidence_threshold: 0.5,
            title_policy: TitlePolicy::default(),
            premium_domains: default_premium_domains(),
            excluded_domains: default_excluded_domains(),
            cache_ttl_seconds: DEFAULT_CACHE_TTL_SECS,
            cache_capacity: 1_000,
            circuit_breaker: CircuitBreakerConfig::default(),
            country: None,
            language: None,
            user_agent: None,
        }
    }
}

impl SearchConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `max_results` must be greater than 0
    /// - `timeout_seconds` must be greater than 0
    /// - `providers` must not be empty and must not repeat
    /// - confidence bounds must lie in `[0.0, 1.0]`
    /// - `cache_ttl_seconds` must not exceed [`MAX_CACHE_TTL_SECS`]
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.max_results == 0 {
            return Err(SearchError::Config(
                "max_results must be greater than 0".into(),
            ));
        }
        if self.timeout_seconds == 0 {
            return Err(SearchError::Config(
                "timeout_seconds must be greater than 0".into(),
            ));
        }
        if self.providers.is_empty() {
            return Err(SearchError::Config(
                "at least one provider must be enabled".into(),
            ));
        }
        for (i, p) in self.providers.iter().enumerate() {
            if self.providers[..i].contains(p) {
                return Err(SearchError::Config(format!(
                    "provider {p} listed more than once"
                )));
            }
        }
        for (name, value) in [
            ("min_confidence", self.min_confidence),
            ("free_confidence_threshold", self.free_confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SearchError::Config(format!(
                    "{name} must be between 0.0 and 1.0"
                )));
            }
        }
        if self.cache_ttl_seconds > MAX_CACHE_TTL_SECS {
            return Err(SearchError::Config(format!(
                "cache_ttl_seconds must not exceed {MAX_CACHE_TTL_SECS}"
            )));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(SearchError::Config(
                "circuit_breaker.failure_threshold must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Position of `provider` in the priority list; unknown providers sort last.
    pub fn priority_of(&self, provider: Provider) -> usize {
        self.providers
            .iter()
            .position(|p| *p == provider)
            .unwrap_or(self.providers.len())
    }
}
