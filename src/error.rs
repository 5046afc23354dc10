//! Error types for docscout.

use docscout_search::SearchError;

/// Top-level error type for metered search and source discovery.
#[derive(Debug, thiserror::Error)]
pub enum ScoutError {
    /// Unusable input (empty query, no domains, unknown run id format).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Every dispatched provider failed for one aggregation.
    #[error("all providers unavailable: {0}")]
    AllProvidersUnavailable(String),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The account cannot cover the computed cost. Raised before any
    /// network work.
    #[error("insufficient balance for {account}: {required} required, {available} available")]
    InsufficientBalance {
        account: String,
        required: u64,
        available: u64,
    },

    /// A site-mapping call failed for one source.
    #[error("mapping failed for {url}: {reason}")]
    MappingFailed { url: String, reason: String },

    /// An upstream service reported exhausted quota. Fatal for a discovery run.
    #[error("upstream quota exhausted: {0}")]
    QuotaExhausted(String),

    /// No requested domain could be mapped.
    #[error("no reachable domains")]
    NoReachableDomains,

    /// Unknown discovery run id.
    #[error("scan run not found: {0}")]
    RunNotFound(String),

    /// Credit ledger failure other than an insufficient balance.
    #[error("credit error: {0}")]
    Credit(String),

    /// Discovery store failure.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// A shared lock was poisoned by a panicking holder.
    #[error("lock poisoned: {0}")]
    Lock(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A background discovery task panicked or was aborted.
    #[error("background task failed: {0}")]
    Task(String),

    /// Search failure that is not one of the variants above.
    #[error("search error: {0}")]
    Search(SearchError),
}

impl From<SearchError> for ScoutError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::InvalidRequest(msg) => Self::InvalidRequest(msg),
            SearchError::Cancelled => Self::Cancelled,
            SearchError::Config(msg) => Self::Config(msg),
            all @ SearchError::AllProvidersUnavailable(_) => {
                let text = all.to_string();
                let detail = text
                    .strip_prefix("all providers unavailable: ")
                    .unwrap_or(&text)
                    .to_string();
                Self::AllProvidersUnavailable(detail)
            }
            other => Self::Search(other),
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ScoutError>;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use docscout_search::Provider;

    #[test]
    fn insufficient_balance_display() {
        let err = ScoutError::InsufficientBalance {
            account: "acct-1".into(),
            required: 30,
            available: 12,
        };
        assert_eq!(
            err.to_string(),
            "insufficient balance for acct-1: 30 required, 12 available"
        );
    }

    #[test]
    fn search_errors_map_onto_scout_variants() {
        let err: ScoutError = SearchError::InvalidRequest("query is empty".into()).into();
        assert!(matches!(err, ScoutError::InvalidRequest(_)));

        let err: ScoutError = SearchError::Cancelled.into();
        assert!(matches!(err, ScoutError::Cancelled));

        let err: ScoutError =
            SearchError::AllProvidersUnavailable(vec![(Provider::Brave, "HTTP 500".into())]).into();
        assert_eq!(err.to_string(), "all providers unavailable: brave: HTTP 500");
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ScoutError>();
    }
}
