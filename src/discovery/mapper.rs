//! Site mapping: enumerate candidate urls under a source.

use std::time::Duration;

use async_trait::async_trait;
use docscout_search::http::{RetryPolicy, random_user_agent};
use serde::{Deserialize, Serialize};

const FIRECRAWL_MAP_ENDPOINT: &str = "https://api.firecrawl.dev/v1/map";

/// Errors from a mapping call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    /// The mapping service refused for lack of credit. Fatal for the run.
    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("mapping request failed: {0}")]
    Failed(String),
}

/// One-shot enumeration of links under a url.
#[async_trait]
pub trait SiteMapper: Send + Sync {
    /// Return at most `limit` links found under `url`.
    async fn map(&self, url: &str, limit: usize) -> Result<Vec<String>, MapError>;

    /// Longest one `map` call may take, retries included. `None` leaves
    /// the bound to the caller.
    fn call_budget(&self) -> Option<Duration> {
        None
    }
}

/// Firecrawl `/v1/map` client.
pub struct FirecrawlMapper {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    timeout: Duration,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct MapRequest<'a> {
    url: &'a str,
    limit: usize,
}

#[derive(Deserialize)]
struct MapResponse {
    #[serde(default)]
    links: Option<Vec<MapLink>>,
    #[serde(default)]
    data: Option<MapData>,
}

#[derive(Deserialize)]
struct MapData {
    #[serde(default)]
    links: Vec<MapLink>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MapLink {
    Url(String),
    Object {
        url: Option<String>,
        link: Option<String>,
    },
    Other(serde_json::Value),
}

impl MapLink {
    fn into_url(self) -> Option<String> {
        match self {
            Self::Url(url) => Some(url),
            Self::Object { url, link } => url.or(link),
            Self::Other(_) => None,
        }
        .filter(|u| !u.is_empty())
    }
}

impl FirecrawlMapper {
    /// # Errors
    ///
    /// Returns [`MapError::Failed`] for an empty key or if the client
    /// cannot be built.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, MapError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(MapError::Failed("Firecrawl API key is empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(random_user_agent())
            .build()
            .map_err(|e| MapError::Failed(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            endpoint: FIRECRAWL_MAP_ENDPOINT.to_string(),
            timeout,
            retry: RetryPolicy {
                max_retries: 2,
                base_delay: Duration::from_millis(500),
            },
        })
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn send_once(&self, url: &str, limit: usize) -> Result<Vec<String>, Retryable> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&MapRequest { url, limit })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    Retryable::Yes(format!("request failed: {e}"))
                } else {
                    Retryable::No(MapError::Failed(format!("request failed: {e}")))
                }
            })?;

        let status = response.status();
        if status.as_u16() == 402 {
            return Err(Retryable::No(MapError::QuotaExhausted(
                "mapping service returned HTTP 402".into(),
            )));
        }
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(Retryable::Yes(format!("HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(Retryable::No(MapError::Failed(format!(
                "unexpected status HTTP {}",
                status.as_u16()
            ))));
        }

        let body: MapResponse = response
            .json()
            .await
            .map_err(|e| Retryable::No(MapError::Failed(format!("malformed response: {e}"))))?;
        Ok(parse_links(body, limit))
    }
}

enum Retryable {
    Yes(String),
    No(MapError),
}

fn parse_links(body: MapResponse, limit: usize) -> Vec<String> {
    let raw = match body.links {
        Some(links) => links,
        None => body.data.map(|d| d.links).unwrap_or_default(),
    };
    raw.into_iter()
        .filter_map(MapLink::into_url)
        .take(limit)
        .collect()
}

#[async_trait]
impl SiteMapper for FirecrawlMapper {
    async fn map(&self, url: &str, limit: usize) -> Result<Vec<String>, MapError> {
        let mut attempt = 0;
        loop {
            match self.send_once(url, limit).await {
                Ok(links) => {
                    tracing::debug!(url, count = links.len(), "site mapped");
                    return Ok(links);
                }
                Err(Retryable::Yes(reason)) if attempt < self.retry.max_retries => {
                    let delay = self.retry.backoff(attempt);
                    tracing::debug!(url, attempt, reason = %reason, "retrying mapping call");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(Retryable::Yes(reason)) => return Err(MapError::Failed(reason)),
                Err(Retryable::No(err)) => return Err(err),
            }
        }
    }

    fn call_budget(&self) -> Option<Duration> {
        Some(self.retry.total_budget(self.timeout))
    }
}
