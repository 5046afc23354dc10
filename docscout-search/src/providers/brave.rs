//! Brave Search API adapter.
//!
//! `GET https://api.search.brave.com/res/v1/web/search` authenticated with
//! `X-Subscription-Token`. The API's `offset` parameter counts pages, not
//! results, and stops at page 9.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::http::{self, RetryPolicy};
use crate::provider::{next_cursor, past_ceiling, ProviderPage, SearchProvider};
use crate::types::{Cursor, Provider, RawResult};

const ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";
const PAGE_SIZE: u32 = 20;
const MAX_OFFSET: u32 = 200;

/// Brave Search adapter.
pub struct BraveProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    retry: RetryPolicy,
    country: Option<String>,
    language: Option<String>,
}

#[derive(Deserialize)]
struct BraveResponse {
    web: Option<BraveWeb>,
}

#[derive(Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Deserialize)]
struct BraveResult {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
}

impl BraveProvider {
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] for an empty key, or
    /// [`SearchError::Http`] if the client cannot be built.
    pub fn new(api_key: impl Into<String>, config: &SearchConfig) -> Result<Self, SearchError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(SearchError::Config("Brave API key is empty".into()));
        }
        Ok(Self {
            client: http::build_client(config)?,
            api_key,
            endpoint: ENDPOINT.to_string(),
            retry: RetryPolicy::from_config(config),
            country: config.country.clone(),
            language: config.language.clone(),
        })
    }

    /// Point the adapter at a different URL (used by tests).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SearchProvider for BraveProvider {
    fn id(&self) -> Provider {
        Provider::Brave
    }

    fn page_size(&self) -> u32 {
        PAGE_SIZE
    }

    fn max_offset(&self) -> u32 {
        MAX_OFFSET
    }

    async fn fetch(&self, query: &str, cursor: Cursor) -> Result<ProviderPage, SearchError> {
        if past_ceiling(cursor, MAX_OFFSET) {
            return Ok(ProviderPage::done());
        }
        tracing::trace!(query, offset = cursor.offset, "Brave search");

        let mut params: Vec<(&str, String)> = vec![
            ("q", query.to_string()),
            ("count", PAGE_SIZE.to_string()),
            ("offset", (cursor.offset / PAGE_SIZE).to_string()),
            ("text_decorations", "false".to_string()),
        ];
        if let Some(country) = &self.country {
            params.push(("country", country.clone()));
        }
        if let Some(lang) = &self.language {
            params.push(("search_lang", lang.clone()));
        }

        let response = http::send_with_retry(Provider::Brave, self.retry, || {
            self.client
                .get(&self.endpoint)
                .query(&params)
                .header("Accept", "application/json")
                .header("X-Subscription-Token", &self.api_key)
        })
        .await?;

        let json = response
            .text()
            .await
            .map_err(|e| SearchError::Http(format!("Brave response read failed: {e}")))?;

        let results = parse_brave_json(&json, cursor.offset)?;
        let next = next_cursor(cursor, results.len(), PAGE_SIZE, MAX_OFFSET);
        Ok(ProviderPage { results, next })
    }
}

/// Parse a Brave response body. Ranks continue from `offset`.
pub(crate) fn parse_brave_json(json: &str, offset: u32) -> Result<Vec<RawResult>, SearchError> {
    let parsed: BraveResponse = serde_json::from_str(json)
        .map_err(|e| SearchError::Parse(format!("Brave JSON: {e}")))?;

    let results: Vec<RawResult> = parsed
        .web
        .map(|w| w.results)
        .unwrap_or_default()
        .into_iter()
        .filter(|r| !r.url.is_empty())
        .enumerate()
        .map(|(i, r)| RawResult {
            provider: Provider::Brave,
            url: r.url,
            title: r.title.trim().to_string(),
            snippet: r.description.trim().to_string(),
            rank: offset + i as u32 + 1,
            mime_hint: None,
        })
        .collect();

    tracing::debug!(count = results.len(), "Brave results parsed");
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn full_page_json() -> String {
        let results: Vec<serde_json::Value> = (0..PAGE_SIZE)
            .map(|i| {
                serde_json::json!({
                    "url": format!("https://example.com/{i}.pdf"),
                    "title": format!("Doc {i}"),
                    "description": "A PDF document"
                })
            })
            .collect();
        serde_json::json!({"web": {"results": results}}).to_string()
    }

    #[test]
    fn parse_description_as_snippet() {
        let json = r#"{"web":{"results":[{"url":"https://a.com/x.pdf","title":" X ","description":"desc"}]}}"#;
        let results = parse_brave_json(json, 20).expect("parse");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "X");
        assert_eq!(results[0].snippet, "desc");
        assert_eq!(results[0].rank, 21);
    }

    #[test]
    fn missing_web_section_is_empty() {
        let results = parse_brave_json(r#"{"type":"search"}"#, 0).expect("parse");
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn full_page_continues_with_page_offset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("X-Subscription-Token", "brave-key"))
            .and(query_param("offset", "1"))
            .and(query_param("count", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_string(full_page_json()))
            .expect(1)
            .mount(&server)
            .await;

        let provider = BraveProvider::new("brave-key", &SearchConfig::default())
            .expect("provider")
            .with_endpoint(server.uri());
        let page = provider
            .fetch("pump filetype:pdf", Cursor { offset: 20 })
            .await
            .expect("fetch");
        assert_eq!(page.results.len(), 20);
        assert_eq!(page.results[0].rank, 21);
        assert_eq!(page.next, Some(Cursor { offset: 40 }));
    }

    #[tokio::test]
    async fn last_page_before_ceiling_is_done() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(full_page_json()))
            .mount(&server)
            .await;

        let provider = BraveProvider::new("k", &SearchConfig::default())
            .expect("provider")
            .with_endpoint(server.uri());
        let page = provider
            .fetch("q", Cursor { offset: 180 })
            .await
            .expect("fetch");
        assert_eq!(page.next, None);
    }
}
