//! DuckDuckGo HTML endpoint, the keyless fallback provider.
//!
//! Uses the HTML-only version at `https://html.duckduckgo.com/html/`,
//! which needs no JavaScript. Pagination is the `s` form field (result
//! offset); the endpoint stops serving useful pages after a few.

use async_trait::async_trait;
use scraper::{Html, Selector};
use url::Url;

use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::http::{self, RetryPolicy};
use crate::provider::{next_cursor, past_ceiling, ProviderPage, SearchProvider};
use crate::types::{Cursor, Provider, RawResult};

const ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const PAGE_SIZE: u32 = 30;
const MAX_OFFSET: u32 = 90;

/// DuckDuckGo HTML scraper.
pub struct DuckDuckGoProvider {
    client: reqwest::Client,
    endpoint: String,
    retry: RetryPolicy,
}

impl DuckDuckGoProvider {
    /// # Errors
    ///
    /// Returns [`SearchError::Http`] if the client cannot be built.
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        Ok(Self {
            client: http::build_client(config)?,
            endpoint: ENDPOINT.to_string(),
            retry: RetryPolicy::from_config(config),
        })
    }

    /// Point the adapter at a different URL (used by tests).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Extract the target URL from DuckDuckGo's redirect wrapper.
///
/// DDG wraps URLs like `//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com&rut=...`.
fn extract_url(href: &str) -> Option<String> {
    let full_href = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };

    let parsed = Url::parse(&full_href).ok()?;

    if parsed.host_str() == Some("duckduckgo.com") && parsed.path().starts_with("/l/") {
        parsed
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, value)| value.into_owned())
    } else {
        Some(full_href)
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    fn id(&self) -> Provider {
        Provider::DuckDuckGo
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
        tracing::trace!(query, offset = cursor.offset, "DuckDuckGo search");

        let offset = cursor.offset.to_string();
        let mut params = vec![("q", query)];
        if !cursor.is_start() {
            params.push(("s", offset.as_str()));
            params.push(("dc", offset.as_str()));
        }

        let response = http::send_with_retry(Provider::DuckDuckGo, self.retry, || {
            self.client
                .post(&self.endpoint)
                .form(&params)
                .header("Accept-Language", "en-US,en;q=0.9")
        })
        .await?;

        let html = response
            .text()
            .await
            .map_err(|e| SearchError::Http(format!("DuckDuckGo response read failed: {e}")))?;

        tracing::trace!(bytes = html.len(), "DuckDuckGo response received");

        let results = parse_duckduckgo_html(&html, cursor.offset, PAGE_SIZE as usize)?;
        let next = next_cursor(cursor, results.len(), PAGE_SIZE, MAX_OFFSET);
        Ok(ProviderPage { results, next })
    }
}

/// Parse a DuckDuckGo HTML page. Ranks continue from `offset`.
pub(crate) fn parse_duckduckgo_html(
    html: &str,
    offset: u32,
    max_results: usize,
) -> Result<Vec<RawResult>, SearchError> {
    let document = Html::parse_document(html);

    let result_sel = Selector::parse(
        ".result.results_links.results_links_deep:not(.result--ad), .web-result:not(.result--ad)",
    )
    .map_err(|e| SearchError::Parse(format!("invalid result selector: {e:?}")))?;
    let title_sel = Selector::parse(".result__a")
        .map_err(|e| SearchError::Parse(format!("invalid title selector: {e:?}")))?;
    let snippet_sel = Selector::parse(".result__snippet")
        .map_err(|e| SearchError::Parse(format!("invalid snippet selector: {e:?}")))?;

    let mut results = Vec::new();

    for element in document.select(&result_sel) {
        let Some(title_el) = element.select(&title_sel).next() else {
            continue;
        };

        let title = title_el.text().collect::<String>().trim().to_string();
        if title.is_empty() {
            continue;
        }

        let Some(url) = title_el.value().attr("href").and_then(extract_url) else {
            continue;
        };

        let snippet = element
            .select(&snippet_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        results.push(RawResult {
            provider: Provider::DuckDuckGo,
            url,
            title,
            snippet,
            rank: offset + results.len() as u32 + 1,
            mime_hint: None,
        });

        if results.len() >= max_results {
            break;
        }
    }

    tracing::debug!(count = results.len(), "DuckDuckGo results parsed");
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MOCK_DDG_HTML: &str = r#"<!DOCTYPE html>
<html>
<body>
<div class="result results_links results_links_deep web-result">
    <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fpumps.example.com%2Fdocs%2Fmanual.pdf&amp;rut=abc123">
        Hydraulic Pump Manual (PDF)
    </a>
    <div class="result__snippet">
        Installation and maintenance manual for hydraulic gear pumps.
    </div>
</div>
<div class="result results_links results_links_deep web-result result--ad">
    <a class="result__a" href="https://ads.example.com/">Buy pumps (Ad)</a>
</div>
<div class="result results_links results_links_deep web-result">
    <a class="result__a" href="https://library.example.org/files/pump-datasheet.pdf">
        Pump datasheet
    </a>
</div>
</body>
</html>"#;

    #[test]
    fn extract_url_from_ddg_redirect() {
        let href = "//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fa.pdf&rut=abc";
        assert_eq!(extract_url(href), Some("https://example.com/a.pdf".to_string()));
    }

    #[test]
    fn extract_url_direct_link() {
        let href = "https://example.com/direct.pdf";
        assert_eq!(extract_url(href), Some(href.to_string()));
    }

    #[test]
    fn extract_url_invalid() {
        assert!(extract_url("not-a-url").is_none());
    }

    #[test]
    fn parse_mock_html_skips_ads() {
        let results = parse_duckduckgo_html(MOCK_DDG_HTML, 0, 30).expect("should parse");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://pumps.example.com/docs/manual.pdf");
        assert_eq!(results[0].title, "Hydraulic Pump Manual (PDF)");
        assert!(results[0].snippet.contains("gear pumps"));
        assert_eq!(results[1].snippet, "");
        assert_eq!(results[1].rank, 2);
        assert!(results.iter().all(|r| !r.title.contains("(Ad)")));
    }

    #[test]
    fn parse_respects_max_results() {
        let results = parse_duckduckgo_html(MOCK_DDG_HTML, 0, 1).expect("should parse");
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn parse_empty_html_returns_empty() {
        let results =
            parse_duckduckgo_html("<html><body></body></html>", 0, 30).expect("should parse");
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn later_pages_send_offset() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("s=30"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MOCK_DDG_HTML))
            .expect(1)
            .mount(&server)
            .await;

        let provider = DuckDuckGoProvider::new(&SearchConfig::default())
            .expect("provider")
            .with_endpoint(server.uri());
        let page = provider
            .fetch("pump filetype:pdf", Cursor { offset: 30 })
            .await
            .expect("fetch");
        assert_eq!(page.results[0].rank, 31);
        assert_eq!(page.next, None);
    }

    #[tokio::test]
    #[ignore] // Live test, run with `cargo test -- --ignored`
    async fn live_duckduckgo_search() {
        let provider = DuckDuckGoProvider::new(&SearchConfig::default()).expect("provider");
        let page = provider
            .fetch("hydraulic pump manual filetype:pdf", Cursor::start())
            .await
            .expect("live search should work");
        assert!(!page.results.is_empty());
    }
}
