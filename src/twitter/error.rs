use std::time::Duration;

use http::StatusCode;
use serde::Deserialize;

use crate::retry::rate_limit_hint;

/// A failed call to the remote API.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("rate limited by remote API")]
    RateLimited { retry_after: Option<Duration> },

    #[error("remote API rejected the credentials (HTTP {status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("remote API returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("request to remote API failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode remote response: {0}")]
    Decode(String),

    #[error("invalid remote URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl RemoteError {
    /// Build an error from a non-success response, consuming its body.
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let retry_after = rate_limit_hint(response.headers(), chrono::Utc::now());
        let body = response.text().await.unwrap_or_default();
        Self::from_parts(status, retry_after, &body)
    }

    pub(crate) fn from_parts(status: StatusCode, retry_after: Option<Duration>, body: &str) -> Self {
        let message = error_message(body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        });

        match status {
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited { retry_after },
            StatusCode::UNAUTHORIZED => Self::Unauthorized {
                status: status.as_u16(),
                message,
            },
            _ => Self::Status {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// The credentials are no good; the user has to sign in again.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct ErrorEntry {
    #[serde(default)]
    code: Option<i64>,
    message: String,
}

/// Extract `{"errors":[{"code":..,"message":..}]}` messages, joined.
fn error_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    if parsed.errors.is_empty() {
        return None;
    }
    Some(
        parsed
            .errors
            .iter()
            .map(|e| match e.code {
                Some(code) => format!("{} (code {code})", e.message),
                None => e.message.clone(),
            })
            .collect::<Vec<_>>()
            .join("; "),
    )
}

/// Failures of the sign-in handshake or of the session that carries it.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("token response is missing `{0}`")]
    MissingField(&'static str),

    #[error("provider did not confirm the callback URL")]
    CallbackNotConfirmed,

    #[error("authorization was cancelled")]
    Denied,

    #[error("OAuth token does not match the pending sign-in")]
    TokenMismatch,

    #[error("no sign-in in progress for this session")]
    NotAuthorizing,
}
