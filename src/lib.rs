//! docscout: metered multi-provider document search with domain source
//! discovery.
//!
//! # Architecture
//!
//! - **Search** lives in the `docscout-search` crate: query planning,
//!   provider adapters, merge and classification, the result cache and the
//!   per-provider circuit breaker
//! - **Credits**: every metered call is priced and reserved up front through
//!   an [`AdmissionController`] over a [`CreditLedger`]
//! - **Discovery**: domains found in search results are mapped and their
//!   candidate documents probed under a run-wide concurrency gate
//! - **Store**: domains, sources, documents and run history persist in
//!   SQLite
//!
//! [`Scout`] wires these together from one [`ScoutConfig`].

pub mod config;
pub mod credits;
pub mod discovery;
pub mod error;
pub mod scout_dirs;
pub mod service;
pub mod store;

pub use config::ScoutConfig;
pub use credits::{AdmissionController, CreditLedger, InMemoryLedger};
pub use discovery::{DiscoveryHandle, ProgressEvent, ProgressKind, RunReport};
pub use error::{Result, ScoutError};
pub use service::{AggregateResponse, Scout, ScoutBuilder};
pub use store::{ScanResults, SizeFilter, SqliteDiscoveryStore};

pub use docscout_search::{DocumentType, MergedResult, Provider, SearchRequest};
