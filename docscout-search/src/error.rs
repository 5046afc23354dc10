//! Error types for the docscout-search crate.
//!
//! All errors use stable string messages suitable for display to users
//! and programmatic handling. No API keys or sensitive data appear in
//! error messages.

use crate::types::Provider;

/// Errors that can occur while planning, fetching or aggregating a search.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The request itself is unusable (empty query, unknown provider, ...).
    /// Never retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// One provider could not serve its page. Absorbed by the aggregator
    /// unless every dispatched provider fails.
    #[error("provider {provider} unavailable: {reason}")]
    ProviderUnavailable {
        /// The provider that failed.
        provider: Provider,
        /// Human-readable failure description.
        reason: String,
    },

    /// Every dispatched provider failed for this aggregation.
    #[error("all providers unavailable: {}", join_failures(.0))]
    AllProvidersUnavailable(Vec<(Provider, String)>),

    /// The caller cancelled the aggregation.
    #[error("search cancelled")]
    Cancelled,

    /// A provider request exceeded its timeout.
    #[error("search timed out: {0}")]
    Timeout(String),

    /// An HTTP request to a provider failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Failed to parse a provider response.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid search configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl SearchError {
    /// Whether a retry of the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Http(_))
    }
}

fn join_failures(failures: &[(Provider, String)]) -> String {
    if failures.is_empty() {
        return "no providers dispatched".to_string();
    }
    failures
        .iter()
        .map(|(p, reason)| format!("{p}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience type alias for docscout-search results.
pub type Result<T> = std::result::Result<T, SearchError>;
