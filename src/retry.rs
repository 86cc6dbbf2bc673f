//! Retry logic with exponential backoff for remote API requests.
//!
//! Handles transient failures like 5xx errors, rate limits (429), and
//! connection issues. When the remote API says how long to wait
//! (`Retry-After` or `x-rate-limit-reset`), that hint replaces the computed
//! backoff, capped at the configured maximum delay.

use std::{future::Future, time::Duration};

use chrono::{DateTime, Utc};
use http::HeaderMap;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::config::RetryConfig;

const X_RATE_LIMIT_RESET: &str = "x-rate-limit-reset";

/// Determines if a reqwest error is retryable.
///
/// Connection errors, timeouts, and other transient issues are retryable.
pub fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_connect()
        || error.is_timeout()
        || error.is_request()
        || error
            .status()
            .map(|s| s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS)
            .unwrap_or(false)
}

/// How long the server asked us to wait, if it said.
///
/// `Retry-After` is read as delta-seconds. `x-rate-limit-reset` is an epoch
/// second at which the window reopens.
pub fn rate_limit_hint(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    if let Some(secs) = header_str(headers, http::header::RETRY_AFTER.as_str())
        .and_then(|v| v.trim().parse::<u64>().ok())
    {
        return Some(Duration::from_secs(secs));
    }

    let reset =
        header_str(headers, X_RATE_LIMIT_RESET).and_then(|v| v.trim().parse::<i64>().ok())?;
    let wait = reset - now.timestamp();
    Some(Duration::from_secs(wait.max(0) as u64))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Execute an async operation with retry logic.
///
/// The `make_request` function is called for each attempt, so a request that
/// needs per-attempt state (a fresh OAuth nonce) builds it there.
///
/// Returns the response of the first attempt that is not retryable, the
/// last response once retries are exhausted, or the last transport error.
pub async fn with_retry<F, Fut>(
    config: &RetryConfig,
    operation: &str,
    make_request: F,
) -> Result<reqwest::Response, reqwest::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    if !config.enabled {
        return make_request().await;
    }

    let max_attempts = config.max_retries + 1;
    let mut attempt = 0;

    loop {
        let last_attempt = attempt + 1 >= max_attempts;

        match make_request().await {
            Ok(response) => {
                let status = response.status();

                if config.should_retry_status(status.as_u16()) && !last_attempt {
                    let delay = match rate_limit_hint(response.headers(), Utc::now()) {
                        Some(hint) => config.cap_hint(hint),
                        None => config.delay_for_attempt(attempt),
                    };
                    warn!(
                        operation = operation,
                        status = %status,
                        attempt = attempt + 1,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis(),
                        "Retryable status code, will retry after delay"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }

                if attempt > 0 {
                    debug!(
                        operation = operation,
                        status = %status,
                        attempt = attempt + 1,
                        "Request finished after retry"
                    );
                }

                return Ok(response);
            }
            Err(error) => {
                if is_retryable_error(&error) && !last_attempt {
                    let delay = config.delay_for_attempt(attempt);
                    warn!(
                        operation = operation,
                        error = %error,
                        attempt = attempt + 1,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis(),
                        "Retryable error, will retry after delay"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }

                if attempt > 0 {
                    warn!(
                        operation = operation,
                        error = %error,
                        attempts = attempt + 1,
                        "Request failed after all retry attempts"
                    );
                }

                return Err(error);
            }
        }
    }
}
