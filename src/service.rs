//! The [`Scout`] facade: metered aggregation and discovery over one config.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use docscout_search::providers::{
    BraveProvider, DuckDuckGoProvider, SerperProvider, YandexProvider,
};
use docscout_search::{
    Aggregator, CacheStats, Cursor, DocumentType, MergedResult, Provider, ProviderHealthReport,
    SearchProvider, SearchRequest,
};
use tokio_util::sync::CancellationToken;

use crate::config::ScoutConfig;
use crate::credits::{AdmissionController, CreditLedger, InMemoryLedger};
use crate::discovery::{
    DiscoveryBilling, DiscoveryEngine, DiscoveryHandle, FirecrawlMapper, HttpProber, Prober,
    SiteMapper, extract_domains,
};
use crate::error::{Result, ScoutError};
use crate::store::{
    DiscoveredDocument, DiscoveredDomain, DiscoveredSource, DiscoveryStore, ScanResults,
    SizeFilter, SourceStatus, SqliteDiscoveryStore, StoreStatistics,
};

/// Result of one metered aggregation.
#[derive(Debug, Clone)]
pub struct AggregateResponse {
    pub results: Vec<MergedResult>,
    /// Providers that were requested but produced no page, in priority order.
    pub failed_providers: Vec<Provider>,
    pub provider_errors: Vec<(Provider, String)>,
    pub from_cache: bool,
    /// Credits debited for this call.
    pub charged: u64,
    /// Cursors for the next page, per provider that has one.
    pub next_cursors: BTreeMap<Provider, Cursor>,
}

/// Builds a [`Scout`], defaulting every collaborator from the config.
pub struct ScoutBuilder {
    config: ScoutConfig,
    ledger: Option<Arc<dyn CreditLedger>>,
    store: Option<Arc<dyn DiscoveryStore>>,
    providers: Option<Vec<Arc<dyn SearchProvider>>>,
    mapper: Option<Arc<dyn SiteMapper>>,
    prober: Option<Arc<dyn Prober>>,
}

impl ScoutBuilder {
    pub fn new(config: ScoutConfig) -> Self {
        Self {
            config,
            ledger: None,
            store: None,
            providers: None,
            mapper: None,
            prober: None,
        }
    }

    #[must_use]
    pub fn ledger(mut self, ledger: Arc<dyn CreditLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn DiscoveryStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the adapters otherwise built from `[api_keys]`.
    #[must_use]
    pub fn providers(mut self, providers: Vec<Arc<dyn SearchProvider>>) -> Self {
        self.providers = Some(providers);
        self
    }

    #[must_use]
    pub fn mapper(mut self, mapper: Arc<dyn SiteMapper>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    #[must_use]
    pub fn prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = Some(prober);
        self
    }

    /// # Errors
    ///
    /// Returns [`ScoutError::Config`] for an invalid configuration, or a
    /// store error if the default SQLite store cannot be opened.
    pub fn build(self) -> Result<Scout> {
        let Self {
            config,
            ledger,
            store,
            providers,
            mapper,
            prober,
        } = self;
        config.validate()?;

        let providers = match providers {
            Some(p) => p,
            None => default_providers(&config)?,
        };
        let aggregator = Aggregator::new(config.search.clone(), providers)?;

        let ledger: Arc<dyn CreditLedger> = match ledger {
            Some(l) => l,
            None => Arc::new(InMemoryLedger::with_starting_balance(
                config.credits.starting_balance,
            )),
        };
        let admission = AdmissionController::new(ledger, config.credits.clone());

        let store: Arc<dyn DiscoveryStore> = match store {
            Some(s) => s,
            None => Arc::new(SqliteDiscoveryStore::open(&config.store.db_path())?),
        };

        let mapper = match mapper {
            Some(m) => Some(m),
            None => default_mapper(&config)?,
        };
        let prober: Arc<dyn Prober> = match prober {
            Some(p) => p,
            None => Arc::new(
                HttpProber::new(Duration::from_secs(config.discovery.probe_timeout_seconds))
                    .map_err(|e| ScoutError::Config(e.to_string()))?,
            ),
        };
        let discovery = mapper.map(|mapper| {
            DiscoveryEngine::new(
                Arc::clone(&store),
                mapper,
                prober,
                config.discovery.clone(),
            )
        });

        tracing::debug!(
            providers = ?aggregator.available_providers(),
            discovery = discovery.is_some(),
            "scout initialised"
        );

        Ok(Scout {
            config,
            aggregator,
            admission,
            store,
            discovery,
        })
    }
}

/// One adapter per provider listed in `[search].providers` that has its
/// credentials. DuckDuckGo needs none.
fn default_providers(config: &ScoutConfig) -> Result<Vec<Arc<dyn SearchProvider>>> {
    let keys = &config.api_keys;
    let search = &config.search;
    let mut adapters: Vec<Arc<dyn SearchProvider>> = Vec::new();
    for provider in &search.providers {
        match provider {
            Provider::Google => {
                if let Some(key) = keys.serper.as_deref() {
                    adapters.push(Arc::new(SerperProvider::new(key, search)?));
                }
            }
            Provider::Brave => {
                if let Some(key) = keys.brave.as_deref() {
                    adapters.push(Arc::new(BraveProvider::new(key, search)?));
                }
            }
            Provider::Yandex => {
                if let (Some(key), Some(folder)) =
                    (keys.yandex.as_deref(), keys.yandex_folder_id.as_deref())
                {
                    adapters.push(Arc::new(YandexProvider::new(key, folder, search)?));
                }
            }
            Provider::DuckDuckGo => {
                adapters.push(Arc::new(DuckDuckGoProvider::new(search)?));
            }
        }
    }
    Ok(adapters)
}

fn default_mapper(config: &ScoutConfig) -> Result<Option<Arc<dyn SiteMapper>>> {
    let Some(key) = config.api_keys.firecrawl.as_deref() else {
        return Ok(None);
    };
    let timeout = Duration::from_secs(config.discovery.map_timeout_seconds);
    let mut mapper =
        FirecrawlMapper::new(key, timeout).map_err(|e| ScoutError::Config(e.to_string()))?;
    if let Some(endpoint) = &config.discovery.firecrawl_endpoint {
        mapper = mapper.with_endpoint(endpoint.clone());
    }
    Ok(Some(Arc::new(mapper)))
}

/// Metered document search and source discovery.
pub struct Scout {
    config: ScoutConfig,
    aggregator: Aggregator,
    admission: AdmissionController,
    store: Arc<dyn DiscoveryStore>,
    discovery: Option<DiscoveryEngine>,
}

impl Scout {
    pub fn builder(config: ScoutConfig) -> ScoutBuilder {
        ScoutBuilder::new(config)
    }

    pub fn config(&self) -> &ScoutConfig {
        &self.config
    }

    pub fn available_providers(&self) -> Vec<Provider> {
        self.aggregator.available_providers()
    }

    /// Search every available (or requested) provider, charging `account`.
    ///
    /// A cache hit costs the flat cache price. A fresh aggregation reserves
    /// the sum of the dispatched providers' prices first and commits it only
    /// if at least one provider answered.
    ///
    /// # Errors
    ///
    /// [`ScoutError::InvalidRequest`], [`ScoutError::InsufficientBalance`]
    /// (before any network call), [`ScoutError::AllProvidersUnavailable`] or
    /// [`ScoutError::Cancelled`]. No credit is debited on any error.
    pub async fn aggregate(
        &self,
        account: &str,
        request: SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<AggregateResponse> {
        let plan = self.aggregator.plan(&request)?;

        if let Some(hit) = self.aggregator.lookup_cached(&plan).await {
            let admission =
                self.admission
                    .admit(account, self.admission.quote_cache_hit(), "search cache hit")?;
            let charged = admission.commit()?;
            return Ok(AggregateResponse {
                results: hit.results,
                failed_providers: hit.failed_providers,
                provider_errors: hit.provider_errors,
                from_cache: true,
                charged,
                next_cursors: hit.next_cursors,
            });
        }

        let cost = self.admission.quote_aggregation(&plan.dispatch);
        let admission = self.admission.admit(account, cost, "search aggregation")?;
        match self.aggregator.execute(&plan, cancel).await {
            Ok(outcome) => {
                let charged = admission.commit()?;
                Ok(AggregateResponse {
                    results: outcome.results,
                    failed_providers: outcome.failed_providers,
                    provider_errors: outcome.provider_errors,
                    from_cache: false,
                    charged,
                    next_cursors: outcome.next_cursors,
                })
            }
            Err(e) => {
                admission.release();
                Err(e.into())
            }
        }
    }

    /// Distinct domains in `results`, most hits first.
    pub fn extract_domains(
        &self,
        results: &[MergedResult],
        origin_query: &str,
    ) -> Vec<DiscoveredDomain> {
        extract_domains(results, origin_query)
    }

    /// Reserve the mapping cost and start a discovery run.
    ///
    /// # Errors
    ///
    /// [`ScoutError::Config`] without a site mapper,
    /// [`ScoutError::InvalidRequest`] for no domains, or
    /// [`ScoutError::InsufficientBalance`].
    pub fn start_discovery(
        &self,
        account: &str,
        domains: &[DiscoveredDomain],
        doc_type: DocumentType,
    ) -> Result<DiscoveryHandle> {
        let engine = self.discovery.as_ref().ok_or_else(|| {
            ScoutError::Config("no site mapper configured (set FIRECRAWL_API_KEY)".into())
        })?;
        let plan = engine.plan(domains)?;
        let quote = self.admission.quote_discovery(plan.map_calls());
        let billing = if quote > 0 {
            Some(DiscoveryBilling {
                admission: self.admission.admit(account, quote, "source discovery")?,
                unit_cost: self.admission.costs().discovery_map,
            })
        } else {
            None
        };
        engine.start(plan, doc_type, billing)
    }

    /// The run record with its sources and size-filtered documents.
    ///
    /// # Errors
    ///
    /// [`ScoutError::RunNotFound`] for an unknown id.
    pub fn scan_results(&self, run_id: &str, filter: &SizeFilter) -> Result<ScanResults> {
        let run = self
            .store
            .get_run(run_id)?
            .ok_or_else(|| ScoutError::RunNotFound(run_id.to_string()))?;
        Ok(ScanResults {
            sources: self.store.run_sources(run_id)?,
            documents: self.store.run_documents(run_id, filter)?,
            run,
        })
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.aggregator.cache_stats().await
    }

    pub fn clear_cache(&self) {
        self.aggregator.clear_cache();
    }

    pub fn provider_health(&self) -> Vec<ProviderHealthReport> {
        self.aggregator.health_report()
    }

    /// Credits `account` can still reserve.
    ///
    /// # Errors
    ///
    /// Returns the ledger's error, e.g. for an unknown account.
    pub fn available_credit(&self, account: &str) -> Result<u64> {
        Ok(self.admission.available(account)?)
    }

    pub fn statistics(&self, recent_runs: usize) -> Result<StoreStatistics> {
        self.store.statistics(recent_runs)
    }

    pub fn sources(
        &self,
        domain: Option<&str>,
        status: Option<SourceStatus>,
    ) -> Result<Vec<DiscoveredSource>> {
        self.store.list_sources(domain, status)
    }

    pub fn documents(
        &self,
        domain: Option<&str>,
        filter: &SizeFilter,
    ) -> Result<Vec<DiscoveredDocument>> {
        self.store.list_documents(domain, filter)
    }

    /// Return a source to `pending` so the next run maps it again.
    pub fn reset_source(&self, domain: &str, path: &str) -> Result<bool> {
        self.store.reset_source(domain, path)
    }
}
