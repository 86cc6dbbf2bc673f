use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::{
    session::SessionError,
    sweep::SweepError,
    templates::TemplateError,
    twitter::{AuthError, RemoteError},
};

/// JSON error body: `{"ok": false, "error": {"code": .., "message": ..}}`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: ErrorInfo,
}

#[derive(Debug, Serialize)]
pub struct ErrorInfo {
    pub code: &'static str,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: ErrorInfo {
                code,
                message: message.into(),
            },
        }
    }
}

/// Handler failure. Page handlers render their own error pages, so what
/// reaches this type is either a JSON endpoint failure or an internal fault.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("no active session")]
    NoSession,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Sweep(#[from] SweepError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("deletion run ended without reporting back")]
    RunAborted,
}

impl From<RemoteError> for AppError {
    fn from(err: RemoteError) -> Self {
        AppError::Sweep(SweepError::Remote(err))
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::NoSession | AppError::Session(SessionError::NotFound) => (
                StatusCode::UNAUTHORIZED,
                "no_session",
                "Your session has expired. Start again from the form.".to_string(),
            ),
            AppError::Session(SessionError::RunInProgress) => (
                StatusCode::CONFLICT,
                "run_in_progress",
                "A deletion run is already in progress.".to_string(),
            ),
            AppError::Session(err @ SessionError::WrongStage { .. }) => {
                (StatusCode::CONFLICT, "wrong_stage", err.to_string())
            }
            AppError::Sweep(SweepError::Remote(err)) | AppError::Auth(AuthError::Remote(err))
                if err.is_auth_failure() =>
            {
                (
                    StatusCode::UNAUTHORIZED,
                    "remote_unauthorized",
                    "The remote service rejected your sign-in. Sign in again.".to_string(),
                )
            }
            AppError::Sweep(SweepError::Remote(err)) | AppError::Auth(AuthError::Remote(err)) => {
                (StatusCode::BAD_GATEWAY, "remote_error", err.to_string())
            }
            AppError::Sweep(err @ SweepError::DeadlineExceeded(_)) => {
                (StatusCode::GATEWAY_TIMEOUT, "fetch_deadline_exceeded", err.to_string())
            }
            AppError::Auth(err) => (StatusCode::UNAUTHORIZED, "auth_failed", err.to_string()),
            AppError::Template(_) | AppError::RunAborted => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        if status.is_server_error() {
            tracing::error!(error = %self, code, "Request failed");
        } else {
            tracing::warn!(error = %self, code, "Request rejected");
        }

        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http_body_util::BodyExt;
    use rstest::rstest;

    use super::*;

    async fn render(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[rstest]
    #[case::no_session(AppError::NoSession, StatusCode::UNAUTHORIZED, "no_session")]
    #[case::in_progress(
        AppError::Session(SessionError::RunInProgress),
        StatusCode::CONFLICT,
        "run_in_progress"
    )]
    #[case::remote_unauthorized(
        AppError::from(RemoteError::Unauthorized { status: 401, message: "Invalid or expired token.".into() }),
        StatusCode::UNAUTHORIZED,
        "remote_unauthorized"
    )]
    #[case::remote_failure(
        AppError::from(RemoteError::Status { status: 503, message: "Over capacity".into() }),
        StatusCode::BAD_GATEWAY,
        "remote_error"
    )]
    #[case::deadline(
        AppError::Sweep(SweepError::DeadlineExceeded(Duration::from_secs(600))),
        StatusCode::GATEWAY_TIMEOUT,
        "fetch_deadline_exceeded"
    )]
    #[case::run_aborted(
        AppError::RunAborted,
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error"
    )]
    #[case::token_mismatch(
        AppError::Auth(AuthError::TokenMismatch),
        StatusCode::UNAUTHORIZED,
        "auth_failed"
    )]
    #[tokio::test]
    async fn test_status_and_code(
        #[case] err: AppError,
        #[case] status: StatusCode,
        #[case] code: &str,
    ) {
        let (actual_status, body) = render(err).await;

        assert_eq!(actual_status, status);
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"]["code"], code);
        assert!(body["error"]["message"].as_str().is_some_and(|m| !m.is_empty()));
    }

    #[tokio::test]
    async fn test_remote_message_is_passed_through() {
        let (_, body) = render(AppError::from(RemoteError::Status {
            status: 503,
            message: "Over capacity".into(),
        }))
        .await;

        assert_eq!(
            body["error"]["message"],
            "remote API returned HTTP 503: Over capacity"
        );
    }
}
