//! Yandex Cloud Search API adapter.
//!
//! Searches are asynchronous operations: `POST .../v2/web/searchAsync`
//! returns an operation id which is polled until `done`. The finished
//! operation carries the Yandex XML response base64-encoded in
//! `response.rawData`. Authentication uses an API key
//! (`Authorization: Api-Key ...`) scoped to a cloud folder.

use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use std::time::Duration;

use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::http::{self, RetryPolicy};
use crate::provider::{next_cursor, past_ceiling, ProviderPage, SearchProvider};
use crate::types::{Cursor, Provider, RawResult};

const SEARCH_ENDPOINT: &str = "https://searchapi.api.cloud.yandex.net/v2/web/searchAsync";
const OPERATION_ENDPOINT: &str = "https://operation.api.cloud.yandex.net/operations";
const PAGE_SIZE: u32 = 10;
/// Five pages of ten.
const MAX_OFFSET: u32 = 50;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_MAX_POLLS: u32 = 30;

/// Yandex adapter.
pub struct YandexProvider {
    client: reqwest::Client,
    api_key: String,
    folder_id: String,
    search_type: String,
    search_endpoint: String,
    operation_endpoint: String,
    retry: RetryPolicy,
    poll_interval: Duration,
    max_polls: u32,
}

#[derive(Deserialize)]
struct Operation {
    id: Option<String>,
    #[serde(default)]
    done: bool,
    response: Option<OperationResponse>,
    error: Option<OperationError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    #[serde(default)]
    raw_data: String,
}

#[derive(Deserialize)]
struct OperationError {
    #[serde(default)]
    message: String,
}

impl YandexProvider {
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] for an empty key or folder id, or
    /// [`SearchError::Http`] if the client cannot be built.
    pub fn new(
        api_key: impl Into<String>,
        folder_id: impl Into<String>,
        config: &SearchConfig,
    ) -> Result<Self, SearchError> {
        let api_key = api_key.into();
        let folder_id = folder_id.into();
        if api_key.trim().is_empty() {
            return Err(SearchError::Config("Yandex API key is empty".into()));
        }
        if folder_id.trim().is_empty() {
            return Err(SearchError::Config("Yandex folder id is empty".into()));
        }
        let search_type = match config.language.as_deref() {
            Some("ru") => "SEARCH_TYPE_RU",
            Some("tr") => "SEARCH_TYPE_TR",
            _ => "SEARCH_TYPE_COM",
        };
        Ok(Self {
            client: http::build_client(config)?,
            api_key,
            folder_id,
            search_type: search_type.to_string(),
            search_endpoint: SEARCH_ENDPOINT.to_string(),
            operation_endpoint: OPERATION_ENDPOINT.to_string(),
            retry: RetryPolicy::from_config(config),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        })
    }

    /// Point the adapter at different endpoints (used by tests).
    #[must_use]
    pub fn with_endpoints(
        mut self,
        search_endpoint: impl Into<String>,
        operation_endpoint: impl Into<String>,
    ) -> Self {
        self.search_endpoint = search_endpoint.into();
        self.operation_endpoint = operation_endpoint.into();
        self
    }

    /// Override operation polling cadence.
    #[must_use]
    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    fn auth_header(&self) -> String {
        format!("Api-Key {}", self.api_key)
    }

    async fn start_operation(&self, query: &str, page: u32) -> Result<String, SearchError> {
        let body = serde_json::json!({
            "query": {
                "searchType": self.search_type,
                "queryText": query,
                "page": page.to_string(),
            },
            "folderId": self.folder_id,
            "responseFormat": "FORMAT_XML",
        });

        let response = http::send_with_retry(Provider::Yandex, self.retry, || {
            self.client
                .post(&self.search_endpoint)
                .header("Authorization", self.auth_header())
                .json(&body)
        })
        .await?;

        let operation: Operation = response
            .json()
            .await
            .map_err(|e| SearchError::Parse(format!("Yandex operation JSON: {e}")))?;

        operation
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SearchError::Parse("Yandex operation id missing".into()))
    }

    async fn await_operation(&self, id: &str) -> Result<String, SearchError> {
        let url = format!("{}/{id}", self.operation_endpoint.trim_end_matches('/'));

        for _ in 0..self.max_polls {
            tokio::time::sleep(self.poll_interval).await;

            let response = http::send_with_retry(Provider::Yandex, self.retry, || {
                self.client
                    .get(&url)
                    .header("Authorization", self.auth_header())
            })
            .await?;

            let operation: Operation = response
                .json()
                .await
                .map_err(|e| SearchError::Parse(format!("Yandex operation JSON: {e}")))?;

            if let Some(err) = operation.error {
                return Err(SearchError::ProviderUnavailable {
                    provider: Provider::Yandex,
                    reason: format!("operation failed: {}", err.message),
                });
            }
            if operation.done {
                let raw = operation.response.map(|r| r.raw_data).unwrap_or_default();
                if raw.is_empty() {
                    return Ok(String::new());
                }
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(raw.as_bytes())
                    .map_err(|e| SearchError::Parse(format!("Yandex rawData base64: {e}")))?;
                return String::from_utf8(bytes)
                    .map_err(|e| SearchError::Parse(format!("Yandex rawData utf-8: {e}")));
            }
        }

        Err(SearchError::Timeout(format!(
            "Yandex operation {id} not done after {} polls",
            self.max_polls
        )))
    }
}

#[async_trait]
impl SearchProvider for YandexProvider {
    fn id(&self) -> Provider {
        Provider::Yandex
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
        tracing::trace!(query, offset = cursor.offset, "Yandex search");

        let id = self.start_operation(query, cursor.offset / PAGE_SIZE).await?;
        let xml = self.await_operation(&id).await?;
        if xml.is_empty() {
            return Ok(ProviderPage::done());
        }

        let results = parse_yandex_xml(&xml, cursor.offset)?;
        let next = next_cursor(cursor, results.len(), PAGE_SIZE, MAX_OFFSET);
        Ok(ProviderPage { results, next })
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Url,
    Title,
    Passage,
    Mime,
}

#[derive(Default)]
struct DocBuilder {
    url: String,
    title: String,
    passage: String,
    mime: String,
    passages_seen: u32,
}

/// Parse a Yandex XML search response. Ranks continue from `offset`.
///
/// Title and first passage text include highlighted (`<hlword>`) runs.
pub(crate) fn parse_yandex_xml(xml: &str, offset: u32) -> Result<Vec<RawResult>, SearchError> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_reader(xml.as_bytes());
    let mut buf = Vec::new();
    let mut results = Vec::new();
    let mut doc: Option<DocBuilder> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"doc" => doc = Some(DocBuilder::default()),
                    b"url" if doc.is_some() => field = Some(Field::Url),
                    b"title" if doc.is_some() => field = Some(Field::Title),
                    b"mime-type" if doc.is_some() => field = Some(Field::Mime),
                    b"passage" => {
                        if let Some(d) = doc.as_mut() {
                            d.passages_seen += 1;
                            if d.passages_seen == 1 {
                                field = Some(Field::Passage);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(te)) => {
                if let (Some(d), Some(f)) = (doc.as_mut(), field) {
                    let text = te
                        .unescape()
                        .map_err(|e| SearchError::Parse(format!("Yandex XML text: {e}")))?;
                    match f {
                        Field::Url => d.url.push_str(&text),
                        Field::Title => d.title.push_str(&text),
                        Field::Passage => d.passage.push_str(&text),
                        Field::Mime => d.mime.push_str(&text),
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"url" | b"title" | b"passage" | b"mime-type" => field = None,
                b"doc" => {
                    if let Some(d) = doc.take() {
                        let url = d.url.trim().to_string();
                        if !url.is_empty() {
                            let mime = d.mime.trim();
                            results.push(RawResult {
                                provider: Provider::Yandex,
                                url,
                                title: collapse_whitespace(&d.title),
                                snippet: collapse_whitespace(&d.passage),
                                rank: offset + results.len() as u32 + 1,
                                mime_hint: (!mime.is_empty()).then(|| mime.to_string()),
                            });
                        }
                    }
                    field = None;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(SearchError::Parse(format!("Yandex XML: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    tracing::debug!(count = results.len(), "Yandex results parsed");
    Ok(results)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
