//! Lightweight existence and size checks for candidate documents.

use std::time::Duration;

use async_trait::async_trait;
use docscout_search::DocumentType;
use docscout_search::http::random_user_agent;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, HeaderMap, RANGE};

/// What a probe learned about one url.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub status: u16,
    pub content_type: Option<String>,
    pub size_bytes: Option<u64>,
    /// Url after redirects.
    pub final_url: String,
}

/// A probe that produced no answer. The candidate is "not confirmed".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("probe timed out")]
    Timeout,

    #[error("probe failed: {0}")]
    Http(String),
}

#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, url: &str) -> Result<ProbeOutcome, ProbeError>;
}

/// `HEAD` prober with a ranged `GET` fallback for servers that refuse `HEAD`.
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    /// # Errors
    ///
    /// Returns [`ProbeError::Http`] if the client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(random_user_agent())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| ProbeError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn ranged_get(&self, url: &str) -> Result<ProbeOutcome, ProbeError> {
        let response = self
            .client
            .get(url)
            .header(RANGE, "bytes=0-0")
            .send()
            .await
            .map_err(request_error)?;
        let status = response.status();
        let final_url = response.url().to_string();
        let headers = response.headers();
        let size_bytes = if status == StatusCode::PARTIAL_CONTENT {
            content_range_total(headers)
        } else {
            content_length(headers)
        };
        Ok(ProbeOutcome {
            status: status.as_u16(),
            content_type: content_type(headers),
            size_bytes,
            final_url,
        })
    }
}

fn request_error(e: reqwest::Error) -> ProbeError {
    if e.is_timeout() {
        ProbeError::Timeout
    } else {
        ProbeError::Http(e.to_string())
    }
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Total from `Content-Range: bytes 0-0/12345`. `*` means unknown.
fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.rsplit_once('/'))
        .and_then(|(_, total)| total.trim().parse().ok())
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, url: &str) -> Result<ProbeOutcome, ProbeError> {
        let response = self.client.head(url).send().await.map_err(request_error)?;
        let status = response.status();
        if matches!(
            status,
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED
        ) {
            tracing::trace!(url, "HEAD refused, falling back to ranged GET");
            return self.ranged_get(url).await;
        }
        let headers = response.headers();
        Ok(ProbeOutcome {
            status: status.as_u16(),
            content_type: content_type(headers),
            size_bytes: content_length(headers),
            final_url: response.url().to_string(),
        })
    }
}

/// Whether a probed candidate counts as a discovered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptanceRule {
    pub doc_type: DocumentType,
    pub min_bytes: u64,
    pub max_bytes: Option<u64>,
    pub accept_unknown_size: bool,
}

impl AcceptanceRule {
    pub fn accepts(&self, url: &str, outcome: &ProbeOutcome) -> bool {
        if !(200..300).contains(&outcome.status) {
            return false;
        }
        let typed = outcome
            .content_type
            .as_deref()
            .is_some_and(|ct| self.doc_type.matches_mime(ct))
            || has_extension(self.doc_type, url)
            || has_extension(self.doc_type, &outcome.final_url);
        if !typed {
            return false;
        }
        match outcome.size_bytes {
            Some(size) => {
                size >= self.min_bytes && self.max_bytes.is_none_or(|max| size <= max)
            }
            None => self.accept_unknown_size,
        }
    }
}

fn has_extension(doc_type: DocumentType, url: &str) -> bool {
    url::Url::parse(url).is_ok_and(|u| doc_type.matches_path(u.path()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rule() -> AcceptanceRule {
        AcceptanceRule {
            doc_type: DocumentType::Pdf,
            min_bytes: 1_000,
            max_bytes: Some(1_000_000),
            accept_unknown_size: true,
        }
    }

    fn outcome(status: u16, ct: Option<&str>, size: Option<u64>) -> ProbeOutcome {
        ProbeOutcome {
            status,
            content_type: ct.map(str::to_string),
            size_bytes: size,
            final_url: "https://example.com/download?id=1".into(),
        }
    }

    #[test]
    fn accepts_matching_mime_within_bounds() {
        let r = rule();
        let url = "https://example.com/download?id=1";
        assert!(r.accepts(url, &outcome(200, Some("application/pdf"), Some(5_000))));
        assert!(!r.accepts(url, &outcome(200, Some("application/pdf"), Some(10))));
        assert!(!r.accepts(url, &outcome(200, Some("application/pdf"), Some(2_000_000))));
        assert!(!r.accepts(url, &outcome(404, Some("application/pdf"), Some(5_000))));
        assert!(!r.accepts(url, &outcome(200, Some("text/html"), Some(5_000))));
    }

    #[test]
    fn extension_stands_in_for_missing_mime() {
        let r = rule();
        assert!(r.accepts(
            "https://example.com/a.pdf",
            &outcome(200, Some("application/octet-stream"), Some(5_000))
        ));
    }

    #[test]
    fn unknown_size_follows_policy() {
        let mut r = rule();
        let o = outcome(200, Some("application/pdf"), None);
        assert!(r.accepts("https://example.com/x", &o));
        r.accept_unknown_size = false;
        assert!(!r.accepts("https://example.com/x", &o));
    }

    #[tokio::test]
    async fn head_reports_type_and_length() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/docs/a.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "application/pdf")
                    .insert_header("Content-Length", "4096"),
            )
            .mount(&server)
            .await;

        let prober = HttpProber::new(Duration::from_secs(5)).expect("prober");
        let url = format!("{}/docs/a.pdf", server.uri());
        let out = prober.probe(&url).await.expect("probe");
        assert_eq!(out.status, 200);
        assert_eq!(out.content_type.as_deref(), Some("application/pdf"));
        assert_eq!(out.size_bytes, Some(4096));
    }

    #[tokio::test]
    async fn falls_back_to_ranged_get_on_405() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(header("Range", "bytes=0-0"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("Content-Type", "application/pdf")
                    .insert_header("Content-Range", "bytes 0-0/123456")
                    .set_body_bytes(vec![b'%']),
            )
            .expect(1)
            .mount(&server)
            .await;

        let prober = HttpProber::new(Duration::from_secs(5)).expect("prober");
        let out = prober
            .probe(&format!("{}/file.pdf", server.uri()))
            .await
            .expect("probe");
        assert_eq!(out.status, 206);
        assert_eq!(out.size_bytes, Some(123_456));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;
        let prober = HttpProber::new(Duration::from_millis(200)).expect("prober");
        let err = prober
            .probe(&format!("{}/slow.pdf", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err, ProbeError::Timeout);
    }
}
