//! Source discovery: expand search hits into per-domain document scans.
//!
//! - `domains`: domain extraction and scan-path derivation.
//! - `mapper`: [`SiteMapper`] and the Firecrawl client.
//! - `prober`: [`Prober`], the HTTP prober and the acceptance rule.
//! - `gate`: the run-wide probe concurrency gate.
//! - `engine`: [`DiscoveryEngine`] and the run handle.

pub mod domains;
pub mod engine;
pub mod gate;
pub mod mapper;
pub mod prober;

pub use domains::{candidate_key, extract_domains, filter_candidates, scan_paths};
pub use engine::{
    DiscoveryBilling, DiscoveryEngine, DiscoveryHandle, DiscoveryPlan, DomainOutcome,
    PlannedDomain, ProgressCounts, ProgressEvent, ProgressKind, RunOutcome, RunReport,
};
pub use gate::{GatePermit, ProbeGate};
pub use mapper::{FirecrawlMapper, MapError, SiteMapper};
pub use prober::{AcceptanceRule, HttpProber, ProbeError, ProbeOutcome, Prober};
