//! Google results through the Serper API.
//!
//! `POST https://google.serper.dev/search` with an `X-API-KEY` header and a
//! JSON body; organic results come back under `organic[]`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::http::{self, RetryPolicy};
use crate::provider::{next_cursor, past_ceiling, ProviderPage, SearchProvider};
use crate::types::{Cursor, Provider, RawResult};

const ENDPOINT: &str = "https://google.serper.dev/search";
const PAGE_SIZE: u32 = 50;
const MAX_OFFSET: u32 = 100;

/// Serper (Google) adapter.
pub struct SerperProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    retry: RetryPolicy,
    country: Option<String>,
    language: Option<String>,
}

#[derive(Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: u32,
    page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    gl: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hl: Option<&'a str>,
}

#[derive(Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperOrganic>,
}

#[derive(Deserialize)]
struct SerperOrganic {
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    position: Option<u32>,
}

impl SerperProvider {
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] for an empty key, or
    /// [`SearchError::Http`] if the client cannot be built.
    pub fn new(api_key: impl Into<String>, config: &SearchConfig) -> Result<Self, SearchError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(SearchError::Config("Serper API key is empty".into()));
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

    /// Point the adapter at a different base URL (used by tests).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SearchProvider for SerperProvider {
    fn id(&self) -> Provider {
        Provider::Google
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
        tracing::trace!(query, offset = cursor.offset, "Serper search");

        let body = SerperRequest {
            q: query,
            num: PAGE_SIZE,
            page: cursor.offset / PAGE_SIZE + 1,
            gl: self.country.as_deref(),
            hl: self.language.as_deref(),
        };

        let response = http::send_with_retry(Provider::Google, self.retry, || {
            self.client
                .post(&self.endpoint)
                .header("X-API-KEY", &self.api_key)
                .json(&body)
        })
        .await?;

        let json = response
            .text()
            .await
            .map_err(|e| SearchError::Http(format!("Serper response read failed: {e}")))?;

        let results = parse_serper_json(&json, cursor.offset)?;
        let next = next_cursor(cursor, results.len(), PAGE_SIZE, MAX_OFFSET);
        Ok(ProviderPage { results, next })
    }
}

/// Parse a Serper response body. Ranks continue from `offset`.
pub(crate) fn parse_serper_json(json: &str, offset: u32) -> Result<Vec<RawResult>, SearchError> {
    let parsed: SerperResponse = serde_json::from_str(json)
        .map_err(|e| SearchError::Parse(format!("Serper JSON: {e}")))?;

    let results: Vec<RawResult> = parsed
        .organic
        .into_iter()
        .enumerate()
        .filter(|(_, o)| !o.link.is_empty())
        .map(|(i, o)| RawResult {
            provider: Provider::Google,
            rank: offset + o.position.unwrap_or(i as u32 + 1),
            url: o.link,
            title: o.title.trim().to_string(),
            snippet: o.snippet.trim().to_string(),
            mime_hint: None,
        })
        .collect();

    tracing::debug!(count = results.len(), "Serper results parsed");
    Ok(results)
}
