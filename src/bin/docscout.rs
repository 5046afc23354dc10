//! CLI binary for docscout.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use docscout::discovery::{DomainOutcome, ProgressKind, RunOutcome};
use docscout::store::{SourceStatus, format_size};
use docscout::{DocumentType, Provider, Scout, ScoutConfig, SearchRequest, SizeFilter};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// docscout: find documents across search providers and scan their sites.
#[derive(Parser)]
#[command(name = "docscout", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Credit account to charge.
    #[arg(long, global = true, default_value = "default")]
    account: String,

    /// Print machine-readable JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search every configured provider for documents.
    Search {
        query: String,
        /// Document type (pdf, doc, docx, xls, xlsx, ppt, pptx).
        #[arg(short = 't', long = "type", default_value = "pdf")]
        doc_type: DocumentType,
        /// Restrict to these providers (comma separated).
        #[arg(short, long, value_delimiter = ',')]
        providers: Vec<Provider>,
    },

    /// Search, then scan the result domains for more documents.
    Discover {
        query: String,
        #[arg(short = 't', long = "type", default_value = "pdf")]
        doc_type: DocumentType,
        /// Scan at most this many domains, most hits first.
        #[arg(long, default_value_t = 10)]
        max_domains: usize,
    },

    /// Show one run's sources and documents.
    Results {
        run_id: String,
        /// Size preset (all, 1mb+, 5mb+, 10mb+, 20mb+, 50mb+, small, medium, large).
        #[arg(long, default_value = "all")]
        size: SizeFilter,
    },

    /// Recent discovery runs and store totals.
    Runs {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// List known sources.
    Sources {
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        status: Option<SourceStatus>,
    },

    /// Return a source to pending so the next run scans it again.
    ResetSource { domain: String, path: String },

    /// Result cache counters.
    CacheStats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so `--json` output stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("docscout=info,docscout_search=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ScoutConfig::load(cli.config.as_deref()).context("loading configuration")?;
    let scout = Scout::builder(config).build().context("initialising docscout")?;

    match cli.command {
        Command::Search {
            query,
            doc_type,
            providers,
        } => run_search(&scout, &cli.account, query, doc_type, providers, cli.json).await,
        Command::Discover {
            query,
            doc_type,
            max_domains,
        } => run_discover(&scout, &cli.account, query, doc_type, max_domains, cli.json).await,
        Command::Results { run_id, size } => show_results(&scout, &run_id, &size, cli.json),
        Command::Runs { limit } => show_runs(&scout, limit, cli.json),
        Command::Sources { domain, status } => {
            show_sources(&scout, domain.as_deref(), status, cli.json)
        }
        Command::ResetSource { domain, path } => {
            if scout.reset_source(&domain, &path)? {
                println!("{domain}{path} reset to pending");
            } else {
                anyhow::bail!("unknown source {domain}{path}");
            }
            Ok(())
        }
        Command::CacheStats => {
            let stats = scout.cache_stats().await;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "hits": stats.hits,
                        "misses": stats.misses,
                        "hit_rate": stats.hit_rate,
                        "entry_count": stats.entry_count,
                    })
                );
            } else {
                println!(
                    "entries: {}  hits: {}  misses: {}  hit rate: {:.1}%",
                    stats.entry_count,
                    stats.hits,
                    stats.misses,
                    stats.hit_rate * 100.0
                );
            }
            Ok(())
        }
    }
}

/// A token cancelled on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling");
            child.cancel();
        }
    });
    token
}

async fn run_search(
    scout: &Scout,
    account: &str,
    query: String,
    doc_type: DocumentType,
    providers: Vec<Provider>,
    json: bool,
) -> anyhow::Result<()> {
    let mut request = SearchRequest::new(query, doc_type);
    if !providers.is_empty() {
        request = request.with_providers(providers);
    }
    let cancel = cancel_on_ctrl_c();
    let response = scout.aggregate(account, request, &cancel).await?;

    if json {
        let errors: Vec<_> = response
            .provider_errors
            .iter()
            .map(|(p, e)| serde_json::json!({"provider": p, "error": e}))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "results": response.results,
                "failed_providers": response.failed_providers,
                "provider_errors": errors,
                "from_cache": response.from_cache,
                "charged": response.charged,
            }))?
        );
        return Ok(());
    }

    for result in &response.results {
        let providers: Vec<&str> = result.providers.iter().map(|p| p.name()).collect();
        println!(
            "{:>3}. [{}] {}\n     {}  ({})",
            result.rank,
            result.classification,
            result.title,
            result.canonical_url,
            providers.join(", ")
        );
    }
    for (provider, error) in &response.provider_errors {
        eprintln!("warning: {} failed: {error}", provider.label());
    }
    eprintln!(
        "{} results{}, charged {} credits",
        response.results.len(),
        if response.from_cache { " (cached)" } else { "" },
        response.charged
    );
    Ok(())
}

async fn run_discover(
    scout: &Scout,
    account: &str,
    query: String,
    doc_type: DocumentType,
    max_domains: usize,
    json: bool,
) -> anyhow::Result<()> {
    let cancel = cancel_on_ctrl_c();
    let response = scout
        .aggregate(account, SearchRequest::new(query.clone(), doc_type), &cancel)
        .await?;
    let mut domains = scout.extract_domains(&response.results, &query);
    domains.truncate(max_domains);
    if domains.is_empty() {
        anyhow::bail!("search returned no domains to scan");
    }

    let mut handle = scout.start_discovery(account, &domains, doc_type)?;
    let run_token = handle.cancellation_token();
    tokio::spawn(async move {
        cancel.cancelled().await;
        run_token.cancel();
    });

    let bar = if json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(domains.len() as u64)
    };
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} domains  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    let run_id = handle.run_id().to_string();
    while let Some(event) = handle.next_event().await {
        bar.set_message(format!(
            "{} probes, {} documents",
            event.counts.probes, event.counts.pdfs_found
        ));
        match &event.kind {
            ProgressKind::DomainDone { outcome } => {
                bar.set_position(event.counts.domains_done as u64);
                let domain = event.domain.as_deref().unwrap_or_default();
                match outcome {
                    DomainOutcome::Failed { error } => {
                        bar.println(format!("failed  {domain}: {error}"));
                    }
                    DomainOutcome::Skipped => bar.println(format!("skipped {domain} (recently scanned)")),
                    DomainOutcome::Completed | DomainOutcome::Cancelled => {}
                }
            }
            ProgressKind::RunDone { outcome } => {
                if let RunOutcome::Failed { error } = outcome {
                    bar.println(format!("run failed: {error}"));
                }
            }
            ProgressKind::Started | ProgressKind::Probe { .. } => {}
        }
        if json {
            println!("{}", serde_json::to_string(&event)?);
        }
    }
    bar.finish_and_clear();

    let report = handle.wait().await?;
    if !json {
        println!(
            "run {run_id}: {} sources, {} documents ({} new){}, charged {} credits",
            report.run.sources_attempted,
            report.run.pdfs_found,
            report.run.new_pdfs,
            if report.run.cancelled { ", cancelled" } else { "" },
            report.charged
        );
    }
    Ok(())
}

fn show_results(scout: &Scout, run_id: &str, size: &SizeFilter, json: bool) -> anyhow::Result<()> {
    let results = scout.scan_results(run_id, size)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    for source in &results.sources {
        println!(
            "{:<9} {}  {} documents{}",
            source.status.as_str(),
            source.url,
            source.pdf_count,
            source
                .error
                .as_deref()
                .map(|e| format!("  ({e})"))
                .unwrap_or_default()
        );
    }
    for doc in &results.documents {
        println!("{:>10}  {}  {}", format_size(doc.size_bytes), doc.title, doc.url);
    }
    Ok(())
}

fn show_runs(scout: &Scout, limit: usize, json: bool) -> anyhow::Result<()> {
    let stats = scout.statistics(limit)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    println!(
        "domains: {}  sources: {} pending, {} scanning, {} completed, {} failed  documents: {}",
        stats.domains,
        stats.pending_sources,
        stats.scanning_sources,
        stats.completed_sources,
        stats.failed_sources,
        stats.documents
    );
    for run in &stats.recent_runs {
        println!(
            "{}  {}  {} sources  {} documents ({} new){}",
            run.run_id,
            run.started_at.format("%Y-%m-%d %H:%M"),
            run.sources_attempted,
            run.pdfs_found,
            run.new_pdfs,
            match (&run.error, run.cancelled) {
                (Some(e), _) => format!("  error: {e}"),
                (None, true) => "  cancelled".to_string(),
                (None, false) => String::new(),
            }
        );
    }
    Ok(())
}

fn show_sources(
    scout: &Scout,
    domain: Option<&str>,
    status: Option<SourceStatus>,
    json: bool,
) -> anyhow::Result<()> {
    let sources = scout.sources(domain, status)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&sources)?);
        return Ok(());
    }
    for source in &sources {
        println!("{:<9} {:>5}  {}", source.status.as_str(), source.pdf_count, source.url);
    }
    Ok(())
}
