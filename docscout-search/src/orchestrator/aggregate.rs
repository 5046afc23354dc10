//! Concurrent multi-provider fan-out with caching and partial-failure
//! reporting.
//!
//! An [`Aggregator`] is built once from a [`SearchConfig`] and a set of
//! provider adapters. It owns the result cache and the provider circuit
//! breaker; there is no process-global state.
//!
//! Aggregation is split into [`Aggregator::plan`], [`Aggregator::lookup_cached`]
//! and [`Aggregator::execute`] so a caller can price the dispatch (and
//! reserve credit for it) between planning and network work.
//! [`Aggregator::aggregate`] runs all three for callers that do not meter.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::cache::{CacheStats, Fingerprint, ResultCache};
use crate::circuit_breaker::{CircuitBreaker, ProviderHealthReport};
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::provider::SearchProvider;
use crate::query::{normalize_query, plan_all};
use crate::types::{Cursor, DocumentType, MergedResult, Provider, RawResult, SearchRequest};

use super::merge::merge_pages;

/// What an aggregation will do, decided before any network call.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchPlan {
    pub normalized_query: String,
    pub doc_type: DocumentType,
    /// Providers targeted by the request, in priority order.
    pub targets: Vec<Provider>,
    /// Providers that will actually be called.
    pub dispatch: Vec<Provider>,
    /// Targets that will not be called, with the reason.
    pub skipped: Vec<(Provider, String)>,
    /// Cursor per dispatched provider.
    pub cursors: BTreeMap<Provider, Cursor>,
    /// Cache key; `None` for "load more" pages, which bypass the cache.
    pub fingerprint: Option<Fingerprint>,
}

/// Result of one aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateOutcome {
    pub results: Vec<MergedResult>,
    /// Targets that failed or were skipped. Empty on a cache hit.
    pub failed_providers: Vec<Provider>,
    /// Failure reason per entry in `failed_providers`.
    pub provider_errors: Vec<(Provider, String)>,
    pub from_cache: bool,
    /// Where each provider with more results continues.
    pub next_cursors: BTreeMap<Provider, Cursor>,
}

/// Fans a request out to providers, merges the pages and caches the result.
pub struct Aggregator {
    config: SearchConfig,
    providers: BTreeMap<Provider, Arc<dyn SearchProvider>>,
    cache: ResultCache,
    breaker: Mutex<CircuitBreaker>,
}

impl Aggregator {
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the configuration is invalid or
    /// two adapters claim the same provider.
    pub fn new(
        config: SearchConfig,
        adapters: Vec<Arc<dyn SearchProvider>>,
    ) -> Result<Self, SearchError> {
        config.validate()?;
        let mut providers = BTreeMap::new();
        for adapter in adapters {
            let id = adapter.id();
            if providers.insert(id, adapter).is_some() {
                return Err(SearchError::Config(format!(
                    "more than one adapter registered for {id}"
                )));
            }
        }
        Ok(Self {
            cache: ResultCache::new(config.cache_capacity),
            breaker: Mutex::new(CircuitBreaker::new(config.circuit_breaker.clone())),
            config,
            providers,
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Providers with a registered adapter, in priority order.
    pub fn available_providers(&self) -> Vec<Provider> {
        self.config
            .providers
            .iter()
            .copied()
            .filter(|p| self.providers.contains_key(p))
            .collect()
    }

    fn breaker(&self) -> MutexGuard<'_, CircuitBreaker> {
        self.breaker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide which providers a request goes to.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidRequest`] if the query is empty after
    /// trimming, or if none of the requested providers is available.
    pub fn plan(&self, request: &SearchRequest) -> Result<DispatchPlan, SearchError> {
        let normalized_query = normalize_query(&request.query, request.doc_type)?;
        let available = self.available_providers();

        let mut skipped = Vec::new();
        let mut targets: Vec<Provider> = match &request.providers {
            None => available,
            Some(requested) => {
                for p in requested {
                    if !available.contains(p) {
                        skipped.push((*p, "provider not configured".to_string()));
                    }
                }
                available
                    .into_iter()
                    .filter(|p| requested.contains(p))
                    .collect()
            }
        };

        if !request.is_first_page() {
            targets.retain(|p| request.cursors.contains_key(p));
        }
        if targets.is_empty() {
            return Err(SearchError::InvalidRequest(
                "none of the requested providers is available".into(),
            ));
        }

        let (dispatch, blocked) = self.breaker().partition(&targets);
        skipped.extend(
            blocked
                .into_iter()
                .map(|p| (p, "circuit open after repeated failures".to_string())),
        );

        let cursors = dispatch
            .iter()
            .map(|p| (*p, request.cursors.get(p).copied().unwrap_or_default()))
            .collect();

        let fingerprint = request
            .is_first_page()
            .then(|| Fingerprint::new(&normalized_query, request.doc_type, &targets));

        Ok(DispatchPlan {
            normalized_query,
            doc_type: request.doc_type,
            targets,
            dispatch,
            skipped,
            cursors,
            fingerprint,
        })
    }

    /// Serve a plan from the cache, if a live entry exists.
    pub async fn lookup_cached(&self, plan: &DispatchPlan) -> Option<AggregateOutcome> {
        let fingerprint = plan.fingerprint.as_ref()?;
        let entry = self.cache.get(fingerprint).await?;
        tracing::debug!(%fingerprint, count = entry.results.len(), "result cache hit");
        Some(AggregateOutcome {
            results: entry.results,
            failed_providers: Vec::new(),
            provider_errors: Vec::new(),
            from_cache: true,
            next_cursors: entry.next_cursors,
        })
    }

    /// Dispatch a plan to its providers concurrently and merge the pages.
    ///
    /// Each provider call is bounded by `timeout_seconds`; a provider that
    /// exceeds it is abandoned and reported as failed. Cancelling
    /// `cancel` drops every in-flight call.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::AllProvidersUnavailable`] if no dispatched
    /// provider succeeded, or [`SearchError::Cancelled`].
    pub async fn execute(
        &self,
        plan: &DispatchPlan,
        cancel: &CancellationToken,
    ) -> Result<AggregateOutcome, SearchError> {
        if plan.dispatch.is_empty() {
            return Err(SearchError::AllProvidersUnavailable(plan.skipped.clone()));
        }

        let timeout = Duration::from_secs(self.config.timeout_seconds);
        let queries = plan_all(&plan.normalized_query, plan.doc_type, &plan.dispatch)?;
        let mut calls = Vec::with_capacity(queries.len());
        for (id, query) in queries {
            let Some(adapter) = self.providers.get(&id).map(Arc::clone) else {
                continue;
            };
            let cursor = plan.cursors.get(&id).copied().unwrap_or_default();
            calls.push(async move {
                let outcome = match tokio::time::timeout(timeout, adapter.fetch(&query, cursor)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(SearchError::Timeout(format!(
                        "no response within {}s",
                        timeout.as_secs()
                    ))),
                };
                (id, outcome)
            });
        }

        let outcomes = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::info!("aggregation cancelled");
                return Err(SearchError::Cancelled);
            }
            outcomes = futures::future::join_all(calls) => outcomes,
        };

        let mut pages: Vec<(Provider, Vec<RawResult>)> = Vec::new();
        let mut provider_errors = plan.skipped.clone();
        let mut next_cursors = BTreeMap::new();
        {
            let mut breaker = self.breaker();
            for (provider, outcome) in outcomes {
                match outcome {
                    Ok(page) => {
                        tracing::debug!(%provider, count = page.results.len(), "provider returned results");
                        breaker.record_success(provider);
                        if let Some(next) = page.next {
                            next_cursors.insert(provider, next);
                        }
                        pages.push((provider, page.results));
                    }
                    Err(err) => {
                        tracing::warn!(provider = %provider, error = %err, "provider query failed");
                        breaker.record_failure(provider);
                        provider_errors.push((provider, err.to_string()));
                    }
                }
            }
        }

        if pages.is_empty() {
            return Err(SearchError::AllProvidersUnavailable(provider_errors));
        }

        let mut results = merge_pages(&pages, plan.doc_type, &self.config);
        results.truncate(self.config.max_results);

        if let Some(fingerprint) = &plan.fingerprint {
            self.cache
                .put(
                    fingerprint.clone(),
                    results.clone(),
                    next_cursors.clone(),
                    Duration::from_secs(self.config.cache_ttl_seconds),
                )
                .await;
        }

        provider_errors.sort_by_key(|(p, _)| self.config.priority_of(*p));
        let failed_providers = provider_errors.iter().map(|(p, _)| *p).collect();

        tracing::debug!(
            count = results.len(),
            failed = provider_errors.len(),
            "aggregation complete"
        );

        Ok(AggregateOutcome {
            results,
            failed_providers,
            provider_errors,
            from_cache: false,
            next_cursors,
        })
    }

    /// Plan, consult the cache and execute on a miss.
    ///
    /// # Errors
    ///
    /// Same as [`Aggregator::plan`] and [`Aggregator::execute`].
    pub async fn aggregate(
        &self,
        request: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<AggregateOutcome, SearchError> {
        let plan = self.plan(request)?;
        if let Some(hit) = self.lookup_cached(&plan).await {
            return Ok(hit);
        }
        self.execute(&plan, cancel).await
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Drop every cached result set.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn health_report(&self) -> Vec<ProviderHealthReport> {
        self.breaker().health_report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderPage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticProvider {
        id: Provider,
        urls: Vec<&'static str>,
        calls: AtomicUsize,
        queries: std::sync::Mutex<Vec<String>>,
        fail: bool,
    }

    impl StaticProvider {
        fn new(id: Provider, urls: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                id,
                urls,
                calls: AtomicUsize::new(0),
                queries: std::sync::Mutex::default(),
                fail: false,
            })
        }

        fn failing(id: Provider) -> Arc<Self> {
            Arc::new(Self {
                id,
                urls: vec![],
                calls: AtomicUsize::new(0),
                queries: std::sync::Mutex::default(),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl SearchProvider for StaticProvider {
        fn id(&self) -> Provider {
            self.id
        }

        fn page_size(&self) -> u32 {
            2
        }

        fn max_offset(&self) -> u32 {
            10
        }

        async fn fetch(&self, query: &str, cursor: Cursor) -> Result<ProviderPage, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().expect("queries").push(query.to_string());
            if self.fail {
                return Err(SearchError::ProviderUnavailable {
                    provider: self.id,
                    reason: "boom".into(),
                });
            }
            assert!(query.ends_with("pdf"));
            let results = self
                .urls
                .iter()
                .enumerate()
                .map(|(i, url)| RawResult {
                    provider: self.id,
                    url: (*url).to_string(),
                    title: format!("Doc {i}"),
                    snippet: String::new(),
                    rank: cursor.offset + i as u32 + 1,
                    mime_hint: None,
                })
                .collect::<Vec<_>>();
            let next = crate::provider::next_cursor(cursor, results.len(), 2, 10);
            Ok(ProviderPage { results, next })
        }
    }

    fn config(providers: Vec<Provider>) -> SearchConfig {
        SearchConfig {
            providers,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn empty_query_is_invalid_request() {
        let agg = Aggregator::new(
            config(vec![Provider::Google]),
            vec![StaticProvider::new(Provider::Google, vec![])],
        )
        .expect("aggregator");
        let req = SearchRequest::new("  filetype:pdf ", DocumentType::Pdf);
        let err = agg.aggregate(&req, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SearchError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn each_provider_receives_its_own_dialect() {
        let google = StaticProvider::new(Provider::Google, vec!["https://a.example/1.pdf"]);
        let yandex = StaticProvider::new(Provider::Yandex, vec!["https://b.example/2.pdf"]);
        let agg = Aggregator::new(
            config(vec![Provider::Google, Provider::Yandex]),
            vec![google.clone(), yandex.clone()],
        )
        .expect("aggregator");
        let req = SearchRequest::new("pump  manual FILETYPE:pdf", DocumentType::Pdf);
        agg.aggregate(&req, &CancellationToken::new()).await.expect("outcome");

        assert_eq!(
            *google.queries.lock().expect("queries"),
            vec!["pump manual filetype:pdf".to_string()]
        );
        assert_eq!(
            *yandex.queries.lock().expect("queries"),
            vec!["pump manual mime:pdf".to_string()]
        );
    }

    #[tokio::test]
    async fn duplicate_adapters_rejected() {
        let result = Aggregator::new(
            config(vec![Provider::Google]),
            vec![
                StaticProvider::new(Provider::Google, vec![]),
                StaticProvider::new(Provider::Google, vec![]),
            ],
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn partial_failure_is_reported_not_fatal() {
        let agg = Aggregator::new(
            config(vec![Provider::Google, Provider::Brave]),
            vec![
                StaticProvider::new(Provider::Google, vec!["https://a.example/1.pdf"]),
                StaticProvider::failing(Provider::Brave),
            ],
        )
        .expect("aggregator");
        let req = SearchRequest::new("pump", DocumentType::Pdf);
        let outcome = agg.aggregate(&req, &CancellationToken::new()).await.expect("outcome");
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.failed_providers, vec![Provider::Brave]);
        assert!(!outcome.from_cache);
    }

    #[tokio::test]
    async fn all_failures_are_fatal_and_not_cached() {
        let agg = Aggregator::new(
            config(vec![Provider::Google]),
            vec![StaticProvider::failing(Provider::Google)],
        )
        .expect("aggregator");
        let req = SearchRequest::new("pump", DocumentType::Pdf);
        let err = agg.aggregate(&req, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SearchError::AllProvidersUnavailable(ref f) if f.len() == 1));
        assert_eq!(agg.cache_stats().await.entry_count, 0);
    }

    #[tokio::test]
    async fn second_request_is_served_from_cache() {
        let google = StaticProvider::new(Provider::Google, vec!["https://a.example/1.pdf"]);
        let agg = Aggregator::new(config(vec![Provider::Google]), vec![google.clone()])
            .expect("aggregator");
        let req = SearchRequest::new("pump", DocumentType::Pdf);
        let first = agg.aggregate(&req, &CancellationToken::new()).await.expect("first");
        let second = agg
            .aggregate(&SearchRequest::new("PUMP  filetype:pdf", DocumentType::Pdf), &CancellationToken::new())
            .await
            .expect("second");
        assert!(second.from_cache);
        assert_eq!(second.results, first.results);
        assert_eq!(google.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn load_more_bypasses_cache_and_targets_cursor_providers() {
        let google = StaticProvider::new(
            Provider::Google,
            vec!["https://a.example/1.pdf", "https://a.example/2.pdf"],
        );
        let brave = StaticProvider::new(Provider::Brave, vec!["https://b.example/1.pdf"]);
        let agg = Aggregator::new(
            config(vec![Provider::Google, Provider::Brave]),
            vec![google.clone(), brave.clone()],
        )
        .expect("aggregator");

        let first = agg
            .aggregate(&SearchRequest::new("pump", DocumentType::Pdf), &CancellationToken::new())
            .await
            .expect("first");
        // Google returned a full page of two; Brave a short page.
        assert_eq!(first.next_cursors.keys().copied().collect::<Vec<_>>(), vec![Provider::Google]);

        let more = SearchRequest::new("pump", DocumentType::Pdf).with_cursors(first.next_cursors.clone());
        let plan = agg.plan(&more).expect("plan");
        assert_eq!(plan.dispatch, vec![Provider::Google]);
        assert!(plan.fingerprint.is_none());

        let page2 = agg.execute(&plan, &CancellationToken::new()).await.expect("page 2");
        assert!(!page2.from_cache);
        assert_eq!(page2.results[0].rank, 3);
        assert_eq!(google.calls.load(Ordering::SeqCst), 2);
        assert_eq!(brave.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unconfigured_requested_provider_is_reported() {
        let agg = Aggregator::new(
            config(vec![Provider::Google, Provider::Yandex]),
            vec![StaticProvider::new(Provider::Google, vec!["https://a.example/1.pdf"])],
        )
        .expect("aggregator");
        let req = SearchRequest::new("pump", DocumentType::Pdf)
            .with_providers(vec![Provider::Google, Provider::Yandex]);
        let outcome = agg.aggregate(&req, &CancellationToken::new()).await.expect("outcome");
        assert_eq!(outcome.failed_providers, vec![Provider::Yandex]);
    }

    #[tokio::test]
    async fn open_circuit_skips_provider() {
        let mut cfg = config(vec![Provider::Google, Provider::Brave]);
        cfg.circuit_breaker.failure_threshold = 1;
        cfg.circuit_breaker.cooldown_secs = 600;
        cfg.cache_ttl_seconds = 0;
        let brave = StaticProvider::failing(Provider::Brave);
        let agg = Aggregator::new(
            cfg,
            vec![
                StaticProvider::new(Provider::Google, vec!["https://a.example/1.pdf"]),
                brave.clone(),
            ],
        )
        .expect("aggregator");
        let req = SearchRequest::new("pump", DocumentType::Pdf);
        let _ = agg.aggregate(&req, &CancellationToken::new()).await.expect("first");
        let plan = agg.plan(&req).expect("plan");
        assert_eq!(plan.dispatch, vec![Provider::Google]);
        assert_eq!(plan.skipped.len(), 1);
        let second = agg.execute(&plan, &CancellationToken::new()).await.expect("second");
        assert_eq!(second.failed_providers, vec![Provider::Brave]);
        assert_eq!(brave.calls.load(Ordering::SeqCst), 1);
    }
}
