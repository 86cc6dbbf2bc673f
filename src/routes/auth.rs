//! `GET /auth/callback` - where the provider sends the browser after sign-in.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_cookies::Cookies;
use tracing::{info, warn};

use super::{
    AppError,
    cookie::current_session,
    pages::{render_error_page, render_form},
};
use crate::{
    AppState,
    oauth1::KeyPair,
    session::{Stage, SweepSession},
    sweep::ThresholdForm,
    templates::IndexContext,
    twitter::AuthError,
};

/// Query parameters of the provider's redirect.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub oauth_token: Option<String>,
    #[serde(default)]
    pub oauth_verifier: Option<String>,
    /// Present instead of the above when the user cancelled.
    #[serde(default)]
    pub denied: Option<String>,
}

/// Check the redirect against the sign-in the session is waiting for,
/// returning the request token and verifier to exchange.
fn check_callback(stage: &Stage, query: &CallbackQuery) -> Result<(KeyPair, String), AuthError> {
    if query.denied.is_some() {
        return Err(AuthError::Denied);
    }
    let Stage::Authorizing { request_token } = stage else {
        return Err(AuthError::NotAuthorizing);
    };

    let token = query
        .oauth_token
        .as_deref()
        .ok_or(AuthError::MissingField("oauth_token"))?;
    if token != request_token.key {
        return Err(AuthError::TokenMismatch);
    }
    let verifier = query
        .oauth_verifier
        .clone()
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingField("oauth_verifier"))?;

    Ok((request_token.clone(), verifier))
}

/// Finish sign-in: exchange the verifier for credentials, fetch the
/// profile, and move on to the confirmation page.
#[tracing::instrument(name = "auth.callback", skip_all)]
pub async fn callback(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, AppError> {
    let Some(mut session) = current_session(&state, &cookies).await? else {
        return Ok(Redirect::to("/").into_response());
    };

    let (request_token, verifier) = match check_callback(&session.stage, &query) {
        Ok(checked) => checked,
        Err(AuthError::NotAuthorizing) => {
            return render_error_page(
                &state,
                StatusCode::BAD_REQUEST,
                "Sign-in link already used",
                "This sign-in has already been completed or was never started. Start again from the form.",
            );
        }
        Err(AuthError::Denied) => {
            info!(session_id = %session.id, "Sign-in cancelled by the user");
            return restart(
                &state,
                session,
                StatusCode::OK,
                "Sign-in was cancelled. Your thresholds are kept below.",
            )
            .await;
        }
        Err(e) => {
            warn!(session_id = %session.id, error = %e, "Rejected sign-in callback");
            return restart(
                &state,
                session,
                StatusCode::BAD_REQUEST,
                "Sign-in could not be verified. Please try again.",
            )
            .await;
        }
    };

    let signed_in = async {
        let credentials = state.twitter.access_token(&request_token, &verifier).await?;
        let profile = state.twitter.verify_credentials(&credentials).await?;
        Ok::<_, AuthError>((credentials, profile))
    }
    .await;

    let (credentials, profile) = match signed_in {
        Ok(signed_in) => signed_in,
        Err(e) => {
            warn!(session_id = %session.id, error = %e, "Sign-in failed");
            session.stage = Stage::Configured;
            state.sessions.update(session).await?;
            return render_error_page(
                &state,
                StatusCode::BAD_GATEWAY,
                "Sign-in failed",
                "The sign-in service did not complete the sign-in. Please try again.",
            );
        }
    };

    info!(
        session_id = %session.id,
        screen_name = %profile.screen_name,
        "Signed in"
    );
    session.stage = Stage::Confirming {
        credentials,
        profile,
    };
    state.sessions.update(session).await?;

    Ok(Redirect::to("/confirm").into_response())
}

/// Drop the pending sign-in and show the form again, thresholds kept.
async fn restart(
    state: &AppState,
    mut session: SweepSession,
    status: StatusCode,
    notice: &str,
) -> Result<Response, AppError> {
    let form = ThresholdForm::from(&session.policy);
    session.stage = Stage::Configured;
    state.sessions.update(session).await?;

    render_form(
        state,
        status,
        &IndexContext::new().with_form(form).with_notice(notice),
    )
}
