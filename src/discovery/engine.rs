//! Discovery run orchestration.
//!
//! A run maps each planned domain's sources, probes the candidate links
//! under one run-wide [`ProbeGate`], and writes every state transition to
//! the [`DiscoveryStore`]. Progress is pushed over a bounded channel and
//! the final [`ScanRun`] is persisted however the run ends.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::Utc;
use docscout_search::DocumentType;
use futures_util::StreamExt;
use futures_util::stream;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::DiscoveryConfig;
use crate::credits::Admission;
use crate::error::{Result, ScoutError};
use crate::store::{
    DiscoveredDocument, DiscoveredDomain, DiscoveredSource, DiscoveryStore, ScanRun,
    SourceStatus, document_title,
};

use super::domains::{filter_candidates, scan_paths};
use super::gate::ProbeGate;
use super::mapper::{MapError, SiteMapper};
use super::prober::{AcceptanceRule, ProbeError, Prober};

/// Rescan windows are clamped to a century.
const MAX_RESCAN_HOURS: u64 = 24 * 365 * 100;

/// A domain selected for this run and the source paths it will map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDomain {
    pub domain: DiscoveredDomain,
    pub sources: Vec<String>,
}

/// Work for one run, decided before any credit is reserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryPlan {
    pub domains: Vec<PlannedDomain>,
    /// Domains scanned within the rescan window.
    pub skipped: Vec<String>,
}

impl DiscoveryPlan {
    /// Upper bound on mapping calls: one per planned source.
    pub fn map_calls(&self) -> usize {
        self.domains.iter().map(|d| d.sources.len()).sum()
    }
}

/// Credit reserved for a run and the price of one successful mapping call.
pub struct DiscoveryBilling {
    pub admission: Admission,
    pub unit_cost: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DomainOutcome {
    Completed,
    Failed { error: String },
    Skipped,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Cancelled,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressKind {
    Started,
    Probe { url: String, accepted: bool },
    DomainDone { outcome: DomainOutcome },
    RunDone { outcome: RunOutcome },
}

/// Running totals at the moment an event was emitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressCounts {
    pub domains_total: usize,
    pub domains_done: usize,
    pub sources_attempted: u64,
    pub probes: u64,
    pub pdfs_found: u64,
    pub new_pdfs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub run_id: String,
    /// `None` for run-level events.
    pub domain: Option<String>,
    #[serde(flatten)]
    pub kind: ProgressKind,
    pub counts: ProgressCounts,
}

/// Summary of a run that ended without a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run: ScanRun,
    pub map_calls: usize,
    pub failed_domains: Vec<(String, String)>,
    pub skipped_domains: Vec<String>,
    /// Credits debited for the run.
    pub charged: u64,
    /// Highest number of probes in flight at once.
    pub peak_probes: usize,
}

/// Caller side of a running discovery.
pub struct DiscoveryHandle {
    run_id: String,
    events: mpsc::Receiver<ProgressEvent>,
    cancel: CancellationToken,
    task: JoinHandle<Result<RunReport>>,
}

impl DiscoveryHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Next progress event, or `None` once the run has finished.
    ///
    /// The channel is bounded: a caller that stops reading stalls the run.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    /// Stop dispatching new work. In-flight probes finish and the partial
    /// run is persisted.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drain remaining events and wait for the run to end.
    ///
    /// # Errors
    ///
    /// Returns the run's fatal error ([`ScoutError::QuotaExhausted`],
    /// [`ScoutError::NoReachableDomains`] or a store failure). A cancelled
    /// run is not an error.
    pub async fn wait(mut self) -> Result<RunReport> {
        while self.events.recv().await.is_some() {}
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(ScoutError::Task(e.to_string())),
        }
    }
}

#[derive(Default)]
struct Tally {
    domains_done: AtomicUsize,
    sources_attempted: AtomicU64,
    probes: AtomicU64,
    pdfs_found: AtomicU64,
    new_pdfs: AtomicU64,
    map_calls: AtomicUsize,
}

impl Tally {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

struct RunContext {
    run_id: String,
    doc_type: DocumentType,
    rule: AcceptanceRule,
    gate: ProbeGate,
    /// Child of the caller's token; also cancelled on quota exhaustion.
    halt: CancellationToken,
    quota: OnceLock<String>,
    tally: Tally,
    domains_total: usize,
    events: mpsc::Sender<ProgressEvent>,
}

impl RunContext {
    fn counts(&self) -> ProgressCounts {
        ProgressCounts {
            domains_total: self.domains_total,
            domains_done: self.tally.domains_done.load(Ordering::Relaxed),
            sources_attempted: self.tally.sources_attempted.load(Ordering::Relaxed),
            probes: self.tally.probes.load(Ordering::Relaxed),
            pdfs_found: self.tally.pdfs_found.load(Ordering::Relaxed),
            new_pdfs: self.tally.new_pdfs.load(Ordering::Relaxed),
        }
    }

    async fn emit(&self, domain: Option<&str>, kind: ProgressKind) {
        let event = ProgressEvent {
            run_id: self.run_id.clone(),
            domain: domain.map(str::to_string),
            kind,
            counts: self.counts(),
        };
        // A dropped receiver only means nobody is watching.
        let _ = self.events.send(event).await;
    }

    fn quota_exhausted(&self, reason: String) {
        let _ = self.quota.set(reason);
        self.halt.cancel();
    }
}

struct DomainReport {
    domain: String,
    outcome: DomainOutcome,
}

/// Runs discovery against a store with pluggable mapping and probing.
#[derive(Clone)]
pub struct DiscoveryEngine {
    store: Arc<dyn DiscoveryStore>,
    mapper: Arc<dyn SiteMapper>,
    prober: Arc<dyn Prober>,
    config: DiscoveryConfig,
}

impl DiscoveryEngine {
    pub fn new(
        store: Arc<dyn DiscoveryStore>,
        mapper: Arc<dyn SiteMapper>,
        prober: Arc<dyn Prober>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            store,
            mapper,
            prober,
            config,
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Choose the domains to scan and their sources.
    ///
    /// # Errors
    ///
    /// [`ScoutError::InvalidRequest`] for an empty domain list, or a store
    /// error while reading scan times.
    pub fn plan(&self, domains: &[DiscoveredDomain]) -> Result<DiscoveryPlan> {
        if domains.is_empty() {
            return Err(ScoutError::InvalidRequest("no domains to discover".into()));
        }
        let hours = self.config.rescan_after_hours.min(MAX_RESCAN_HOURS);
        let window = chrono::Duration::hours(i64::try_from(hours).unwrap_or(0));
        let now = Utc::now();
        let mut seen = HashSet::new();
        let mut plan = DiscoveryPlan::default();

        for domain in domains {
            if !seen.insert(domain.domain.clone()) {
                continue;
            }
            let recent = self
                .store
                .domain_last_scanned(&domain.domain)?
                .is_some_and(|at| now.signed_duration_since(at) < window);
            if recent {
                plan.skipped.push(domain.domain.clone());
                continue;
            }
            plan.domains.push(PlannedDomain {
                domain: domain.clone(),
                sources: scan_paths(domain, self.config.max_sources_per_domain),
            });
        }
        Ok(plan)
    }

    /// Persist a new run and start it in the background.
    ///
    /// # Errors
    ///
    /// Returns a store error if the run record cannot be written. Nothing
    /// has been spawned in that case.
    pub fn start(
        &self,
        plan: DiscoveryPlan,
        doc_type: DocumentType,
        billing: Option<DiscoveryBilling>,
    ) -> Result<DiscoveryHandle> {
        let run = ScanRun::started(uuid::Uuid::new_v4().to_string());
        self.store.begin_run(&run)?;

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(self.config.event_buffer.max(1));
        let ctx = RunContext {
            run_id: run.run_id.clone(),
            doc_type,
            rule: AcceptanceRule {
                doc_type,
                min_bytes: self.config.min_bytes,
                max_bytes: self.config.max_bytes,
                accept_unknown_size: self.config.accept_unknown_size,
            },
            gate: ProbeGate::new(self.config.probe_concurrency),
            halt: cancel.child_token(),
            quota: OnceLock::new(),
            tally: Tally::default(),
            domains_total: plan.domains.len() + plan.skipped.len(),
            events: tx,
        };

        tracing::info!(
            run_id = %run.run_id,
            domains = plan.domains.len(),
            skipped = plan.skipped.len(),
            "discovery run started"
        );

        let engine = self.clone();
        let run_id = run.run_id.clone();
        let stop = cancel.clone();
        let task = tokio::spawn(async move { engine.run(run, plan, ctx, stop, billing).await });

        Ok(DiscoveryHandle {
            run_id,
            events: rx,
            cancel,
            task,
        })
    }

    async fn run(
        self,
        mut run: ScanRun,
        plan: DiscoveryPlan,
        ctx: RunContext,
        stop: CancellationToken,
        billing: Option<DiscoveryBilling>,
    ) -> Result<RunReport> {
        ctx.emit(None, ProgressKind::Started).await;

        for domain in &plan.skipped {
            ctx.tally.domains_done.fetch_add(1, Ordering::Relaxed);
            ctx.emit(
                Some(domain.as_str()),
                ProgressKind::DomainDone {
                    outcome: DomainOutcome::Skipped,
                },
            )
            .await;
        }

        let attempted_domains = plan.domains.len();
        let mut fatal: Option<ScoutError> = None;
        let mut failed_domains = Vec::new();
        {
            let mut domains = stream::iter(plan.domains)
                .map(|planned| self.scan_domain(&ctx, planned))
                .buffer_unordered(self.config.domain_concurrency.max(1));
            while let Some(result) = domains.next().await {
                match result {
                    Ok(report) => {
                        if let DomainOutcome::Failed { error } = &report.outcome {
                            failed_domains.push((report.domain.clone(), error.clone()));
                        }
                    }
                    Err(e) => {
                        tracing::warn!(run_id = %ctx.run_id, error = %e, "discovery run aborted");
                        ctx.halt.cancel();
                        if fatal.is_none() {
                            fatal = Some(e);
                        }
                    }
                }
            }
        }

        let map_calls = ctx.tally.map_calls.load(Ordering::Relaxed);
        let counts = ctx.counts();
        run.completed_at = Some(Utc::now());
        run.sources_attempted = counts.sources_attempted;
        run.pdfs_found = counts.pdfs_found;
        run.new_pdfs = counts.new_pdfs;
        run.cancelled = stop.is_cancelled();

        let fatal = match (fatal, ctx.quota.get()) {
            (Some(e), _) => Some(e),
            (None, Some(reason)) => Some(ScoutError::QuotaExhausted(reason.clone())),
            (None, None) if !run.cancelled && attempted_domains > 0 && map_calls == 0 => {
                Some(ScoutError::NoReachableDomains)
            }
            (None, None) => None,
        };
        run.error = fatal.as_ref().map(ToString::to_string);

        let mut fatal = fatal;
        if let Err(e) = self.store.finish_run(&run) {
            tracing::warn!(run_id = %run.run_id, error = %e, "failed to persist scan run");
            if fatal.is_none() {
                fatal = Some(e);
            }
        }

        let charged = match billing {
            Some(billing) => {
                let amount = billing.unit_cost.saturating_mul(map_calls as u64);
                match billing.admission.settle(amount) {
                    Ok(charged) => charged,
                    Err(e) => {
                        tracing::warn!(run_id = %run.run_id, error = %e, "failed to settle discovery credit");
                        0
                    }
                }
            }
            None => 0,
        };

        let outcome = match &fatal {
            Some(e) => RunOutcome::Failed {
                error: e.to_string(),
            },
            None if run.cancelled => RunOutcome::Cancelled,
            None => RunOutcome::Completed,
        };
        tracing::info!(
            run_id = %run.run_id,
            sources = run.sources_attempted,
            pdfs = run.pdfs_found,
            new_pdfs = run.new_pdfs,
            cancelled = run.cancelled,
            charged,
            "discovery run finished"
        );
        ctx.emit(None, ProgressKind::RunDone { outcome }).await;

        match fatal {
            Some(e) => Err(e),
            None => Ok(RunReport {
                run,
                map_calls,
                failed_domains,
                skipped_domains: plan.skipped,
                charged,
                peak_probes: ctx.gate.peak(),
            }),
        }
    }

    /// Scan one domain's sources in order. `Err` only for store failures.
    async fn scan_domain(&self, ctx: &RunContext, planned: PlannedDomain) -> Result<DomainReport> {
        let name = planned.domain.domain.clone();
        self.store.upsert_domain(&planned.domain)?;
        for path in &planned.sources {
            let mut source = DiscoveredSource::pending(&name, path);
            source.last_run_id = Some(ctx.run_id.clone());
            self.store.upsert_source(&source)?;
        }
        ctx.emit(Some(name.as_str()), ProgressKind::Started).await;

        let mut seen = HashSet::new();
        let mut attempted = 0usize;
        let mut failures = 0usize;
        let mut last_error = None;
        let mut domain_pdfs = 0u64;
        let map_budget = self.map_budget();

        for path in &planned.sources {
            if ctx.halt.is_cancelled() {
                break;
            }
            let mut source = DiscoveredSource::pending(&name, path);
            source.last_run_id = Some(ctx.run_id.clone());
            source.status = SourceStatus::Scanning;
            self.store.upsert_source(&source)?;

            let mapped = tokio::select! {
                biased;
                () = ctx.halt.cancelled() => None,
                r = tokio::time::timeout(map_budget, self.mapper.map(&source.url, self.config.max_paths_per_map)) => Some(r),
            };
            let Some(mapped) = mapped else {
                // Interrupted before the map call returned: not attempted.
                source.status = SourceStatus::Pending;
                self.store.upsert_source(&source)?;
                break;
            };

            attempted += 1;
            Tally::bump(&ctx.tally.sources_attempted);
            source.last_scanned = Some(Utc::now());

            let links = match mapped {
                Ok(Ok(links)) => {
                    ctx.tally.map_calls.fetch_add(1, Ordering::Relaxed);
                    links
                }
                Ok(Err(MapError::QuotaExhausted(reason))) => {
                    tracing::warn!(domain = %name, url = %source.url, reason = %reason, "mapping quota exhausted");
                    failures += 1;
                    source.status = SourceStatus::Failed;
                    source.error = Some(ScoutError::QuotaExhausted(reason.clone()).to_string());
                    last_error.clone_from(&source.error);
                    self.store.record_source_outcome(&ctx.run_id, &source)?;
                    ctx.quota_exhausted(reason);
                    break;
                }
                Ok(Err(MapError::Failed(reason))) => {
                    self.fail_source(ctx, &mut source, reason)?;
                    failures += 1;
                    last_error.clone_from(&source.error);
                    continue;
                }
                Err(_) => {
                    let reason = format!("no response within {}s", map_budget.as_secs());
                    self.fail_source(ctx, &mut source, reason)?;
                    failures += 1;
                    last_error.clone_from(&source.error);
                    continue;
                }
            };

            let candidates = filter_candidates(&links, &name, ctx.doc_type, &mut seen);
            tracing::debug!(domain = %name, path = %path, links = links.len(), candidates = candidates.len(), "source mapped");

            let (accepted, interrupted) = self.probe_candidates(ctx, &source, candidates).await?;
            domain_pdfs += accepted;
            source.pdf_count = accepted;
            if interrupted {
                source.status = SourceStatus::Failed;
                source.error = Some("cancelled before all candidates were probed".into());
            } else {
                source.status = SourceStatus::Completed;
            }
            self.store.record_source_outcome(&ctx.run_id, &source)?;
        }

        let outcome = if attempted > 0 && failures == attempted {
            DomainOutcome::Failed {
                error: last_error.unwrap_or_else(|| "all sources failed".into()),
            }
        } else if ctx.halt.is_cancelled() {
            DomainOutcome::Cancelled
        } else {
            self.store.mark_domain_scanned(&name, domain_pdfs, Utc::now())?;
            DomainOutcome::Completed
        };

        if let DomainOutcome::Failed { error } = &outcome {
            tracing::warn!(domain = %name, error = %error, "domain scan failed");
        }
        ctx.tally.domains_done.fetch_add(1, Ordering::Relaxed);
        ctx.emit(
            Some(name.as_str()),
            ProgressKind::DomainDone {
                outcome: outcome.clone(),
            },
        )
        .await;

        Ok(DomainReport {
            domain: name,
            outcome,
        })
    }

    fn fail_source(
        &self,
        ctx: &RunContext,
        source: &mut DiscoveredSource,
        reason: String,
    ) -> Result<()> {
        let error = ScoutError::MappingFailed {
            url: source.url.clone(),
            reason,
        };
        tracing::warn!(domain = %source.domain, path = %source.path, error = %error, "source mapping failed");
        source.status = SourceStatus::Failed;
        source.error = Some(error.to_string());
        self.store.record_source_outcome(&ctx.run_id, source)
    }

    /// Probe candidates under the run gate. Returns the accepted count and
    /// whether cancellation left some candidates unprobed.
    async fn probe_candidates(
        &self,
        ctx: &RunContext,
        source: &DiscoveredSource,
        candidates: Vec<String>,
    ) -> Result<(u64, bool)> {
        let gate = &ctx.gate;
        let halt = &ctx.halt;
        let prober = self.prober.as_ref();
        let timeout = Duration::from_secs(self.config.probe_timeout_seconds.max(1));

        let mut probes = stream::iter(candidates)
            .map(|url| async move {
                let Some(_permit) = gate.acquire().await else {
                    return None;
                };
                if halt.is_cancelled() {
                    return None;
                }
                let result = match tokio::time::timeout(timeout, prober.probe(&url)).await {
                    Ok(r) => r,
                    Err(_) => Err(ProbeError::Timeout),
                };
                Some((url, result))
            })
            .buffer_unordered(gate.capacity());

        let mut accepted = 0u64;
        let mut interrupted = false;
        while let Some(item) = probes.next().await {
            let Some((url, result)) = item else {
                interrupted = true;
                continue;
            };
            Tally::bump(&ctx.tally.probes);
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::debug!(url = %url, error = %e, "candidate not confirmed");
                    ctx.emit(
                        Some(source.domain.as_str()),
                        ProgressKind::Probe {
                            url,
                            accepted: false,
                        },
                    )
                    .await;
                    continue;
                }
            };

            let ok = ctx.rule.accepts(&url, &outcome);
            if ok {
                let document = DiscoveredDocument {
                    title: document_title(&url),
                    url: url.clone(),
                    domain: source.domain.clone(),
                    source_path: source.path.clone(),
                    size_bytes: outcome.size_bytes,
                    content_type: outcome.content_type,
                    first_run_id: ctx.run_id.clone(),
                    last_run_id: ctx.run_id.clone(),
                    discovered_at: Utc::now(),
                };
                let is_new = self.store.record_document(&document)?;
                accepted += 1;
                Tally::bump(&ctx.tally.pdfs_found);
                if is_new {
                    Tally::bump(&ctx.tally.new_pdfs);
                }
            }
            ctx.emit(
                Some(source.domain.as_str()),
                ProgressKind::Probe { url, accepted: ok },
            )
            .await;
        }
        Ok((accepted, interrupted))
    }

    /// Bound on one mapping call: the mapper's own retry budget when it
    /// reports one, otherwise `map_timeout_seconds`.
    fn map_budget(&self) -> Duration {
        self.mapper
            .call_budget()
            .unwrap_or_else(|| Duration::from_secs(self.config.map_timeout_seconds.max(1)))
    }
}
