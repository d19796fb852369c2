//! Shared JSON-over-HTTP call with timeout, retry, and backoff.
//!
//! Used by the hosted embedding and generation providers:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors (including timeouts) → retry
//! - Backoff: base, 2×base, 4×base, ... (capped at 2^5 × base)

use anyhow::{bail, Result};
use reqwest::StatusCode;
use std::time::Duration;

/// Retry and timeout settings for one service.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub timeout: Duration,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, timeout_secs: u64, backoff_ms: u64) -> Self {
        Self {
            max_retries,
            timeout: Duration::from_secs(timeout_secs),
            backoff_base: Duration::from_millis(backoff_ms),
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(5);
        self.backoff_base * (1u32 << exp)
    }

    pub fn client(&self) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder().timeout(self.timeout).build()?)
    }
}

pub fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// POST `body` as JSON to `url` and return the parsed JSON response.
///
/// `service` names the remote end in error messages (e.g. `"Gemini embeddings"`).
pub async fn post_json(
    client: &reqwest::Client,
    policy: &RetryPolicy,
    service: &str,
    url: &str,
    headers: &[(&str, &str)],
    body: &serde_json::Value,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let delay = policy.backoff(attempt);
            tracing::debug!(service, attempt, ?delay, "retrying request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                if is_retryable(status) {
                    last_err = Some(anyhow::anyhow!("{} error {}: {}", service, status, body_text));
                    continue;
                }

                bail!("{} error {}: {}", service, status, body_text);
            }
            Err(e) => {
                let kind = if e.is_timeout() { "timed out" } else { "connection error" };
                last_err = Some(anyhow::anyhow!("{} {}: {}", service, kind, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} failed after retries", service)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(8, 30, 100);
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(6), Duration::from_millis(3200));
        assert_eq!(policy.backoff(9), Duration::from_millis(3200));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(is_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
        assert!(!is_retryable(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn test_unreachable_host_fails_after_retries() {
        let policy = RetryPolicy::new(1, 1, 1);
        let client = policy.client().unwrap();
        // Port 9 (discard) on localhost is essentially never listening.
        let err = post_json(
            &client,
            &policy,
            "test service",
            "http://127.0.0.1:9/embed",
            &[],
            &serde_json::json!({}),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("test service"));
    }
}
