//! Outbound HTTP calls with bounded retry.
//!
//! [`OutboundClient`] POSTs JSON to external services. Network errors, 5xx,
//! and 429 responses are retried with exponential backoff from
//! [`RetryConfig`]; any other non-success status fails immediately. Every
//! wait races the caller's [`CancellationToken`].

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::error::TaskError;

/// Returns `true` for statuses worth retrying: 5xx and 429.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// JSON-over-HTTP client with timeout and retry policy.
#[derive(Debug, Clone)]
pub struct OutboundClient {
    http: reqwest::Client,
    retry: RetryConfig,
}

impl OutboundClient {
    /// Builds a client whose requests time out after
    /// `retry.request_timeout_ms`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Config`] if the HTTP client cannot be built.
    pub fn new(retry: RetryConfig) -> Result<Self, TaskError> {
        let http = reqwest::Client::builder()
            .timeout(retry.request_timeout())
            .build()
            .map_err(|e| TaskError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, retry })
    }

    /// The retry policy in use.
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// POSTs `body` to `url` and returns the decoded response body.
    ///
    /// A JSON body is returned as-is; anything else is wrapped as
    /// `{"raw_response": "<text>"}`. An empty body yields `null`.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Outbound`] once retries are exhausted, or immediately
    ///   for a non-retryable status.
    /// - [`TaskError::Cancelled`] as soon as `cancel` fires, including
    ///   during a backoff sleep.
    pub async fn post_json(
        &self,
        url: &str,
        body: &Value,
        cancel: &CancellationToken,
    ) -> Result<Value, TaskError> {
        let mut last_error = None;

        for attempt in 0..=self.retry.max_retries {
            if cancel.is_cancelled() {
                return Err(TaskError::Cancelled);
            }

            let sent = tokio::select! {
                res = self.http.post(url).json(body).send() => res,
                _ = cancel.cancelled() => return Err(TaskError::Cancelled),
            };

            match sent {
                Ok(response) if response.status().is_success() => {
                    let text = response.text().await.map_err(|e| TaskError::Outbound {
                        status: None,
                        message: format!("failed to read response body: {e}"),
                    })?;
                    tracing::debug!(url, attempt, "outbound call succeeded");
                    return Ok(decode_body(&text));
                },
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    let err = TaskError::Outbound {
                        status: Some(status.as_u16()),
                        message: text,
                    };
                    if !is_retryable_status(status) {
                        tracing::error!(url, attempt, status = status.as_u16(), "outbound call rejected");
                        return Err(err);
                    }
                    tracing::warn!(url, attempt, status = status.as_u16(), "outbound call failed, will retry");
                    last_error = Some(err);
                },
                Err(e) => {
                    tracing::warn!(url, attempt, error = %e, "outbound request error, will retry");
                    last_error = Some(TaskError::Outbound {
                        status: None,
                        message: e.to_string(),
                    });
                },
            }

            if attempt < self.retry.max_retries {
                let backoff = self.retry.backoff_for(attempt);
                if !sleep_or_cancel(backoff, cancel).await {
                    return Err(TaskError::Cancelled);
                }
            }
        }

        tracing::error!(url, attempts = self.retry.max_retries + 1, "outbound call failed after retries");
        Err(last_error.unwrap_or_else(|| TaskError::Outbound {
            status: None,
            message: "no attempt was made".to_string(),
        }))
    }
}

/// Sleeps for `duration`; returns `false` if cancelled first.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = cancel.cancelled() => false,
    }
}

fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| json!({ "raw_response": text }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn body_decoding() {
        assert_eq!(decode_body(r#"{"ok":true}"#), json!({"ok": true}));
        assert_eq!(decode_body("accepted"), json!({"raw_response": "accepted"}));
        assert_eq!(decode_body("  "), Value::Null);
    }

    #[tokio::test]
    async fn sleep_is_cut_short_by_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!sleep_or_cancel(Duration::from_secs(60), &cancel).await);
    }
}
