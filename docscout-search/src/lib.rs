//! # docscout-search
//!
//! Multi-provider document search for docscout.
//!
//! This crate turns one free-text query plus a document type into a single
//! deduplicated, classified, ordered result list drawn from several web
//! search providers at once.
//!
//! ## Design
//!
//! - Each provider (Serper for Google, Brave, Yandex Cloud, DuckDuckGo HTML)
//!   sits behind the [`SearchProvider`] trait
//! - Queries are normalised once and rewritten per provider with the right
//!   document-type qualifier (`filetype:` or `mime:`)
//! - The [`Aggregator`] fans out concurrently with a per-provider timeout and
//!   absorbs individual failures; only an all-provider failure is an error
//! - Results collapse onto canonical URLs and are classified as free,
//!   premium or unknown
//! - First-page result sets are cached by content fingerprint with a
//!   per-entry expiry
//! - A per-provider circuit breaker skips providers that keep failing
//!
//! ## Security
//!
//! - API keys live only inside adapter structs and are never logged
//! - Queries are logged only at trace level
//! - No network listeners; this is a library

pub mod cache;
pub mod circuit_breaker;
pub mod classify;
pub mod config;
pub mod domains;
pub mod error;
pub mod http;
pub mod orchestrator;
pub mod provider;
pub mod providers;
pub mod query;
pub mod types;

pub use cache::{CacheStats, Fingerprint};
pub use circuit_breaker::{CircuitBreakerConfig, CircuitState, ProviderHealthReport};
pub use config::{SearchConfig, TitlePolicy};
pub use error::{Result, SearchError};
pub use orchestrator::{AggregateOutcome, Aggregator, DispatchPlan};
pub use provider::{ProviderPage, SearchProvider};
pub use types::{
    Classification, Cursor, DocumentType, MergedResult, Provider, RawResult, SearchRequest,
};
