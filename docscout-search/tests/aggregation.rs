//! Integration tests for the aggregation pipeline.
//!
//! Real adapters run against wiremock servers; stalled providers are
//! simulated with in-process adapters. No live network calls.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use docscout_search::providers::{BraveProvider, SerperProvider};
use docscout_search::{
    Aggregator, Classification, Cursor, DocumentType, Provider, ProviderPage, SearchConfig,
    SearchError, SearchProvider, SearchRequest,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config() -> SearchConfig {
    SearchConfig {
        providers: vec![Provider::Google, Provider::Brave],
        max_retries: 0,
        retry_base_delay_ms: 1,
        ..Default::default()
    }
}

async fn serper_server(body: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("X-API-KEY", "serper-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;
    server
}

async fn brave_server(template: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(template)
        .mount(&server)
        .await;
    server
}

fn adapters(
    cfg: &SearchConfig,
    serper: &MockServer,
    brave: &MockServer,
) -> Vec<Arc<dyn SearchProvider>> {
    vec![
        Arc::new(
            SerperProvider::new("serper-key", cfg)
                .expect("serper")
                .with_endpoint(serper.uri()),
        ),
        Arc::new(
            BraveProvider::new("brave-key", cfg)
                .expect("brave")
                .with_endpoint(brave.uri()),
        ),
    ]
}

#[tokio::test]
async fn overlapping_providers_merge_into_one_ordered_list() {
    let serper = serper_server(serde_json::json!({
        "organic": [
            {"link": "https://example.com/a.pdf", "title": "Pump A", "snippet": "", "position": 1},
            {"link": "https://example.com/b.pdf", "title": "Pump B", "snippet": "", "position": 2}
        ]
    }))
    .await;
    let brave = brave_server(ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "web": {"results": [
            {"url": "https://example.org/c.pdf", "title": "Pump C", "description": ""},
            {"url": "https://www.example.com/a.pdf?utm_source=brave", "title": "Pump A", "description": ""}
        ]}
    })))
    .await;

    let cfg = config();
    let agg = Aggregator::new(cfg.clone(), adapters(&cfg, &serper, &brave)).expect("aggregator");
    let outcome = agg
        .aggregate(
            &SearchRequest::new("pump manual", DocumentType::Pdf),
            &CancellationToken::new(),
        )
        .await
        .expect("aggregate");

    let urls: Vec<&str> = outcome.results.iter().map(|r| r.canonical_url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "https://example.com/a.pdf",
            "https://example.com/b.pdf",
            "https://example.org/c.pdf",
        ]
    );
    assert_eq!(outcome.results[0].providers.len(), 2);
    assert!(outcome.results.iter().all(|r| r.classification == Classification::Free));
    assert!(outcome.failed_providers.is_empty());
}

#[tokio::test]
async fn cached_replay_is_identical_and_skips_network() {
    let serper = serper_server(serde_json::json!({
        "organic": [{"link": "https://example.com/a.pdf", "title": "Pump A", "position": 1}]
    }))
    .await;
    let brave = brave_server(
        ResponseTemplate::new(200).set_body_json(serde_json::json!({"web": {"results": []}})),
    )
    .await;

    let cfg = config();
    let agg = Aggregator::new(cfg.clone(), adapters(&cfg, &serper, &brave)).expect("aggregator");
    let req = SearchRequest::new("pump manual", DocumentType::Pdf);
    let first = agg.aggregate(&req, &CancellationToken::new()).await.expect("first");
    let requests_after_first = serper.received_requests().await.map_or(0, |r| r.len());

    let second = agg.aggregate(&req, &CancellationToken::new()).await.expect("second");
    assert!(second.from_cache);
    assert_eq!(second.results, first.results);
    assert_eq!(
        serper.received_requests().await.map_or(0, |r| r.len()),
        requests_after_first
    );

    let stats = agg.cache_stats().await;
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.entry_count, 1);
}

#[tokio::test]
async fn rejected_credentials_are_a_partial_failure() {
    let serper = serper_server(serde_json::json!({
        "organic": [{"link": "https://example.com/a.pdf", "title": "Pump A", "position": 1}]
    }))
    .await;
    let brave = brave_server(ResponseTemplate::new(401)).await;

    let cfg = config();
    let agg = Aggregator::new(cfg.clone(), adapters(&cfg, &serper, &brave)).expect("aggregator");
    let outcome = agg
        .aggregate(
            &SearchRequest::new("pump", DocumentType::Pdf),
            &CancellationToken::new(),
        )
        .await
        .expect("aggregate");
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.failed_providers, vec![Provider::Brave]);
    assert!(outcome.provider_errors[0].1.contains("401"));
}

#[tokio::test]
async fn every_provider_failing_is_an_error() {
    let serper = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&serper)
        .await;
    let brave = brave_server(ResponseTemplate::new(402)).await;

    let cfg = config();
    let agg = Aggregator::new(cfg.clone(), adapters(&cfg, &serper, &brave)).expect("aggregator");
    let err = agg
        .aggregate(
            &SearchRequest::new("pump", DocumentType::Pdf),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    match err {
        SearchError::AllProvidersUnavailable(failures) => {
            let providers: Vec<Provider> = failures.iter().map(|(p, _)| *p).collect();
            assert!(providers.contains(&Provider::Google));
            assert!(providers.contains(&Provider::Brave));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(agg.cache_stats().await.entry_count, 0);
}

struct StalledProvider(Provider);

#[async_trait]
impl SearchProvider for StalledProvider {
    fn id(&self) -> Provider {
        self.0
    }

    fn page_size(&self) -> u32 {
        10
    }

    fn max_offset(&self) -> u32 {
        100
    }

    async fn fetch(&self, _query: &str, _cursor: Cursor) -> Result<ProviderPage, SearchError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(ProviderPage::done())
    }
}

#[tokio::test]
async fn cancellation_abandons_stalled_providers() {
    let cfg = SearchConfig {
        providers: vec![Provider::Google],
        timeout_seconds: 30,
        ..Default::default()
    };
    let agg = Arc::new(
        Aggregator::new(cfg, vec![Arc::new(StalledProvider(Provider::Google))]).expect("aggregator"),
    );
    let cancel = CancellationToken::new();

    let task = {
        let agg = Arc::clone(&agg);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            agg.aggregate(&SearchRequest::new("pump", DocumentType::Pdf), &cancel)
                .await
        })
    };

    let started = Instant::now();
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();
    let result = task.await.expect("join");
    assert!(matches!(result, Err(SearchError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn slow_provider_times_out_without_blocking_others() {
    let serper = serper_server(serde_json::json!({
        "organic": [{"link": "https://example.com/a.pdf", "title": "Pump A", "position": 1}]
    }))
    .await;
    let cfg = SearchConfig {
        providers: vec![Provider::Google, Provider::Yandex],
        timeout_seconds: 1,
        max_retries: 0,
        ..Default::default()
    };
    let agg = Aggregator::new(
        cfg.clone(),
        vec![
            Arc::new(
                SerperProvider::new("serper-key", &cfg)
                    .expect("serper")
                    .with_endpoint(serper.uri()),
            ),
            Arc::new(StalledProvider(Provider::Yandex)),
        ],
    )
    .expect("aggregator");

    let started = Instant::now();
    let outcome = agg
        .aggregate(
            &SearchRequest::new("pump", DocumentType::Pdf),
            &CancellationToken::new(),
        )
        .await
        .expect("aggregate");
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.failed_providers, vec![Provider::Yandex]);
}
