use std::time::{Duration, Instant};

use tracing::{info, warn};

use chime_core::config::DispatchConfig;
use chime_core::types::DeliveryMode;

use crate::error::{Result, SchedulerError};

/// Validate that a job target is a well-formed http(s) URL.
pub fn validate_target(url: &str) -> Result<()> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| SchedulerError::InvalidTarget(format!("{url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(SchedulerError::InvalidTarget(format!(
            "unsupported scheme '{other}': {url}"
        ))),
    }
}

/// Outcome of one logical job invocation (all attempts included).
///
/// HTTP-level failures are data, not errors: a 500 after exhausted retries
/// still produces an outcome, never an `Err`.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub success: bool,
    /// Last observed HTTP status; `None` when no response ever arrived.
    pub http_status: Option<u16>,
    /// Wall time from the first attempt to the final resolution, backoff
    /// delays included.
    pub duration: Duration,
    pub error: Option<String>,
    /// Attempts consumed beyond the first.
    pub retries: u32,
}

/// POSTs to job targets with per-attempt timeout and bounded linear backoff.
#[derive(Clone)]
pub struct HttpDispatcher {
    client: reqwest::Client,
    timeout: Duration,
    max_attempts: u32,
    retry_delay: Duration,
}

impl HttpDispatcher {
    pub fn new(config: &DispatchConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_attempts: config.max_attempts,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// Invoke `url` once, retrying transient failures per `mode`.
    ///
    /// Classification per attempt:
    /// - 2xx: success, done.
    /// - 4xx: permanent failure, done regardless of mode.
    /// - anything else (5xx, unexpected 3xx, no response at all): retried
    ///   under `AtLeastOnce` until the attempt budget runs out.
    ///
    /// The n-th retry waits n times the base delay; no delay after the
    /// final attempt.
    pub async fn execute(&self, url: &str, mode: DeliveryMode) -> DispatchOutcome {
        let start = Instant::now();
        let mut last_status: Option<u16> = None;
        let mut last_error: Option<String> = None;

        for attempt in 0..self.max_attempts {
            match self.client.post(url).timeout(self.timeout).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        if attempt > 0 {
                            info!(%url, attempt, "request succeeded after retry");
                        }
                        return DispatchOutcome {
                            success: true,
                            http_status: Some(status.as_u16()),
                            duration: start.elapsed(),
                            error: None,
                            retries: attempt,
                        };
                    }

                    last_status = Some(status.as_u16());
                    last_error = Some(format!(
                        "HTTP {}: {}",
                        status.as_u16(),
                        status.canonical_reason().unwrap_or("Unknown")
                    ));

                    // 4xx will not change on retry; don't burn attempts on it.
                    if status.is_client_error() || !retryable(mode) {
                        return DispatchOutcome {
                            success: false,
                            http_status: last_status,
                            duration: start.elapsed(),
                            error: last_error,
                            retries: attempt,
                        };
                    }
                }
                Err(e) => {
                    last_status = e.status().map(|s| s.as_u16());
                    last_error = Some(e.to_string());

                    if !retryable(mode) {
                        return DispatchOutcome {
                            success: false,
                            http_status: last_status,
                            duration: start.elapsed(),
                            error: last_error,
                            retries: attempt,
                        };
                    }
                }
            }

            if attempt + 1 < self.max_attempts {
                warn!(
                    %url,
                    attempt,
                    error = last_error.as_deref().unwrap_or("unknown"),
                    "attempt failed, retrying"
                );
                tokio::time::sleep(self.retry_delay * (attempt + 1)).await;
            }
        }

        DispatchOutcome {
            success: false,
            http_status: last_status,
            duration: start.elapsed(),
            error: last_error.or_else(|| Some("unknown error after retries".to_string())),
            retries: self.max_attempts.saturating_sub(1),
        }
    }
}

fn retryable(mode: DeliveryMode) -> bool {
    match mode {
        DeliveryMode::AtLeastOnce => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn dispatcher(max_attempts: u32) -> HttpDispatcher {
        HttpDispatcher::new(&DispatchConfig {
            timeout_secs: 2,
            max_attempts,
            retry_delay_ms: 50,
        })
    }

    #[test]
    fn target_validation_requires_http_scheme() {
        assert!(validate_target("http://example.com/hook").is_ok());
        assert!(validate_target("https://example.com/hook").is_ok());
        assert!(validate_target("ftp://example.com/hook").is_err());
        assert!(validate_target("not a url").is_err());
    }

    #[tokio::test]
    async fn success_on_first_attempt_makes_one_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = dispatcher(3)
            .execute(&format!("{}/hook", server.uri()), DeliveryMode::AtLeastOnce)
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.http_status, Some(200));
        assert_eq!(outcome.retries, 0);
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn client_error_is_terminal_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = dispatcher(3)
            .execute(&format!("{}/hook", server.uri()), DeliveryMode::AtLeastOnce)
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.http_status, Some(404));
        assert_eq!(outcome.retries, 0);
        assert_eq!(outcome.error.as_deref(), Some("HTTP 404: Not Found"));
    }

    #[tokio::test]
    async fn server_error_retries_until_exhaustion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let outcome = dispatcher(3)
            .execute(&format!("{}/hook", server.uri()), DeliveryMode::AtLeastOnce)
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.http_status, Some(500));
        assert_eq!(outcome.retries, 2);
        assert_eq!(
            outcome.error.as_deref(),
            Some("HTTP 500: Internal Server Error")
        );
        // Backoff before retry 1 (50ms) and retry 2 (100ms).
        assert!(outcome.duration >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn connection_failure_is_reported_without_status() {
        // Port 1 is reserved and nothing listens there.
        let outcome = dispatcher(3)
            .execute("http://127.0.0.1:1/hook", DeliveryMode::AtLeastOnce)
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.http_status, None);
        assert_eq!(outcome.retries, 2);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn slow_response_times_out_as_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let outcome = dispatcher(1)
            .execute(&format!("{}/hook", server.uri()), DeliveryMode::AtLeastOnce)
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.http_status, None);
        assert_eq!(outcome.retries, 0);
        assert!(outcome.error.is_some());
    }
}
