//! Discovery data model shared by the engine and the store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A domain surfaced by aggregated results and selected for expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDomain {
    /// Lower-cased host without `www.`.
    pub domain: String,
    pub origin_query: String,
    /// First result url seen on this domain.
    pub origin_url: String,
    /// Directory paths seen in results on this domain, in first-seen order.
    pub paths: Vec<String>,
    /// Number of results on this domain.
    pub hits: usize,
}

/// Lifecycle of one discovered source within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Pending,
    Scanning,
    Completed,
    Failed,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scanning => "scanning",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "scanning" => Ok(Self::Scanning),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown source status: {other}")),
        }
    }
}

/// A candidate directory on a domain. `(domain, path)` is the stable key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredSource {
    pub domain: String,
    /// Directory path with leading and trailing `/`; `/` for the root.
    pub path: String,
    pub url: String,
    pub status: SourceStatus,
    pub pdf_count: u64,
    pub error: Option<String>,
    pub last_run_id: Option<String>,
    pub last_scanned: Option<DateTime<Utc>>,
}

impl DiscoveredSource {
    pub fn pending(domain: &str, path: &str) -> Self {
        Self {
            domain: domain.to_string(),
            path: path.to_string(),
            url: format!("https://{domain}{path}"),
            status: SourceStatus::Pending,
            pdf_count: 0,
            error: None,
            last_run_id: None,
            last_scanned: None,
        }
    }
}

/// A probed and accepted document, keyed by url.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDocument {
    pub url: String,
    pub domain: String,
    pub source_path: String,
    pub title: String,
    pub size_bytes: Option<u64>,
    pub content_type: Option<String>,
    pub first_run_id: String,
    pub last_run_id: String,
    pub discovered_at: DateTime<Utc>,
}

/// One invocation of the discovery engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRun {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub sources_attempted: u64,
    pub pdfs_found: u64,
    pub new_pdfs: u64,
    pub cancelled: bool,
    /// Fatal run-level error, if the run ended on one.
    pub error: Option<String>,
}

impl ScanRun {
    pub fn started(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: Utc::now(),
            completed_at: None,
            sources_attempted: 0,
            pdfs_found: 0,
            new_pdfs: 0,
            cancelled: false,
            error: None,
        }
    }
}

/// Everything recorded for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResults {
    pub run: ScanRun,
    pub sources: Vec<DiscoveredSource>,
    pub documents: Vec<DiscoveredDocument>,
}

/// Aggregate counters over the whole store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStatistics {
    pub domains: u64,
    pub pending_sources: u64,
    pub scanning_sources: u64,
    pub completed_sources: u64,
    pub failed_sources: u64,
    pub documents: u64,
    pub recent_runs: Vec<ScanRun>,
}

/// Title shown for a document: its file name without extension, with
/// separators turned into spaces.
pub fn document_title(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file = path.rsplit('/').find(|s| !s.is_empty()).unwrap_or(path);
    let decoded = urlencoding::decode(file)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| file.to_string());
    let stem = match decoded.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => decoded,
    };
    stem.replace(['_', '-', '+'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            SourceStatus::Pending,
            SourceStatus::Scanning,
            SourceStatus::Completed,
            SourceStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<SourceStatus>(), Ok(status));
        }
        assert!("error".parse::<SourceStatus>().is_err());
    }

    #[test]
    fn pending_source_builds_url() {
        let source = DiscoveredSource::pending("example.com", "/docs/manuals/");
        assert_eq!(source.url, "https://example.com/docs/manuals/");
        assert!(!source.status.is_terminal());
    }

    #[test]
    fn title_comes_from_file_name() {
        assert_eq!(
            document_title("https://example.com/docs/Pump_Manual-v2.pdf?dl=1"),
            "Pump Manual v2"
        );
        assert_eq!(
            document_title("https://example.com/files/hydraulic%20pump.pdf"),
            "hydraulic pump"
        );
        assert_eq!(document_title("https://example.com/README"), "README");
    }
}
