//! Shared HTTP client construction and retry policy for provider requests.
//!
//! Provides a configured [`reqwest::Client`] with rotating User-Agent
//! strings, and [`send_with_retry`], which retries transient failures
//! (HTTP 429, 5xx, timeouts, connection errors) with exponential backoff
//! and jitter before reporting the provider unavailable.

use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;

use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::types::Provider;

/// Realistic browser User-Agent strings, rotated per client.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
];

/// Upper bound on a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Build a [`reqwest::Client`] for provider requests.
///
/// # Errors
///
/// Returns [`SearchError::Http`] if the client cannot be constructed.
pub fn build_client(config: &SearchConfig) -> Result<reqwest::Client, SearchError> {
    let ua = match config.user_agent {
        Some(ref custom) => custom.clone(),
        None => random_user_agent().to_owned(),
    };

    reqwest::Client::builder()
        .cookie_store(true)
        .timeout(Duration::from_secs(config.timeout_seconds))
        .user_agent(ua)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| SearchError::Http(format!("failed to build HTTP client: {e}")))
}

/// Select a random User-Agent string from the rotation list.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Retry budget for one provider request.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`
    /// plus up to `base` of jitter, capped at [`MAX_BACKOFF`].
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let exp = base_ms.saturating_mul(1u64 << attempt.min(16));
        let jitter = if base_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=base_ms)
        };
        Duration::from_millis(exp.saturating_add(jitter)).min(MAX_BACKOFF)
    }

    /// Longest a request can take with every retry used: each attempt runs
    /// for up to `per_attempt`, plus the largest possible backoff between them.
    pub fn total_budget(&self, per_attempt: Duration) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let backoff: Duration = (0..self.max_retries)
            .map(|attempt| {
                let exp = base_ms.saturating_mul(1u64 << attempt.min(16));
                Duration::from_millis(exp.saturating_add(base_ms)).min(MAX_BACKOFF)
            })
            .sum();
        per_attempt
            .saturating_mul(self.max_retries.saturating_add(1))
            .saturating_add(backoff)
    }
}

enum Attempt {
    Retry(String),
    Fatal(String),
}

/// Send a request, retrying transient failures.
///
/// `build` is called once per attempt because a sent
/// [`reqwest::RequestBuilder`] cannot be reused.
///
/// # Errors
///
/// Returns [`SearchError::ProviderUnavailable`] when the response is a
/// non-retryable failure (401, 402, 403, other 4xx) or when retries are
/// exhausted.
pub async fn send_with_retry<F>(
    provider: Provider,
    policy: RetryPolicy,
    mut build: F,
) -> Result<reqwest::Response, SearchError>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;
    loop {
        let outcome = match build().send().await {
            Ok(response) => classify_status(response),
            Err(e) if e.is_timeout() => Err(Attempt::Retry("request timed out".into())),
            Err(e) if e.is_connect() => Err(Attempt::Retry(format!("connection failed: {e}"))),
            Err(e) => Err(Attempt::Fatal(format!("request failed: {e}"))),
        };

        match outcome {
            Ok(response) => return Ok(response),
            Err(Attempt::Retry(reason)) if attempt < policy.max_retries => {
                let delay = policy.backoff(attempt);
                tracing::debug!(
                    %provider,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    reason = %reason,
                    "retrying provider request"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(Attempt::Retry(reason) | Attempt::Fatal(reason)) => {
                return Err(SearchError::ProviderUnavailable { provider, reason });
            }
        }
    }
}

fn classify_status(response: reqwest::Response) -> Result<reqwest::Response, Attempt> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let code = status.as_u16();
    match code {
        429 => Err(Attempt::Retry("rate limited (HTTP 429)".into())),
        500..=599 => Err(Attempt::Retry(format!("server error (HTTP {code})"))),
        401 | 403 => Err(Attempt::Fatal(format!("credentials rejected (HTTP {code})"))),
        402 => Err(Attempt::Fatal("quota exhausted (HTTP 402)".into())),
        _ => Err(Attempt::Fatal(format!("unexpected status (HTTP {code})"))),
    }
}
