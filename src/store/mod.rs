//! Discovery persistence.
//!
//! Sub-modules:
//! - `types`: domains, sources, documents and scan runs.
//! - `size`: [`SizeFilter`] presets and [`format_size`].
//! - `schema`: SQLite DDL.
//! - `sqlite`: [`SqliteDiscoveryStore`].
//!
//! The store holds no business logic. The discovery engine is the only
//! writer of source status transitions.

pub(crate) mod schema;
pub mod size;
pub mod sqlite;
pub mod types;

use chrono::{DateTime, Utc};

use crate::error::Result;

pub use size::{SizeFilter, format_size};
pub use sqlite::SqliteDiscoveryStore;
pub use types::{
    DiscoveredDocument, DiscoveredDomain, DiscoveredSource, ScanResults, ScanRun, SourceStatus,
    StoreStatistics, document_title,
};

/// Persistence seam for discovery runs.
pub trait DiscoveryStore: Send + Sync {
    /// Insert a domain or refresh its origin and hit count.
    fn upsert_domain(&self, domain: &DiscoveredDomain) -> Result<()>;

    /// When the domain was last scanned to completion, if ever.
    fn domain_last_scanned(&self, domain: &str) -> Result<Option<DateTime<Utc>>>;

    fn mark_domain_scanned(&self, domain: &str, pdf_count: u64, at: DateTime<Utc>) -> Result<()>;

    /// Insert a source or overwrite its mutable fields, keeping its identity.
    fn upsert_source(&self, source: &DiscoveredSource) -> Result<()>;

    /// Write a terminal source state and append it to the run's history.
    fn record_source_outcome(&self, run_id: &str, source: &DiscoveredSource) -> Result<()>;

    /// Insert or refresh a document and link it to `document.last_run_id`.
    /// Returns `true` when the url was not known before.
    fn record_document(&self, document: &DiscoveredDocument) -> Result<bool>;

    fn begin_run(&self, run: &ScanRun) -> Result<()>;

    fn finish_run(&self, run: &ScanRun) -> Result<()>;

    fn get_run(&self, run_id: &str) -> Result<Option<ScanRun>>;

    /// Most recent runs first.
    fn recent_runs(&self, limit: usize) -> Result<Vec<ScanRun>>;

    /// Source outcomes recorded by one run.
    fn run_sources(&self, run_id: &str) -> Result<Vec<DiscoveredSource>>;

    /// Documents accepted by one run, filtered by size.
    fn run_documents(&self, run_id: &str, filter: &SizeFilter) -> Result<Vec<DiscoveredDocument>>;

    fn list_sources(
        &self,
        domain: Option<&str>,
        status: Option<SourceStatus>,
    ) -> Result<Vec<DiscoveredSource>>;

    fn list_documents(
        &self,
        domain: Option<&str>,
        filter: &SizeFilter,
    ) -> Result<Vec<DiscoveredDocument>>;

    /// Return a source to `pending`. Returns `false` if it does not exist.
    fn reset_source(&self, domain: &str, path: &str) -> Result<bool>;

    fn statistics(&self, recent_runs: usize) -> Result<StoreStatistics>;
}
