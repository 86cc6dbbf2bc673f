//! The browser flow: threshold form → sign-in → confirmation → deletion run.
//!
//! - `GET /` - the threshold form
//! - `POST /connect` - validate thresholds and start sign-in
//! - `GET /confirm` - show the signed-in account and the thresholds
//! - `POST /confirm` - fetch, filter and delete (JSON)
//! - `GET /status` - the session's stage and, once done, the deletion report (JSON)
//! - `POST /logout` - drop the session

use std::sync::Arc;

use axum::{
    Form, Json,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::oneshot;
use tower_cookies::Cookies;
use tracing::{Instrument, info, warn};

use super::{
    AppError,
    cookie::{current_session, removal_cookie, session_cookie, session_id},
};
use crate::{
    AppState,
    session::{SessionError, SessionStore, Stage, SweepSession},
    sweep::{DeletionReport, RetentionPolicy, SweepContext, SweepError, ThresholdForm},
    templates::{ConfirmContext, ErrorContext, IndexContext},
    twitter::{Profile, TwitterClient},
};

/// Render the threshold form.
pub(crate) fn render_form(
    state: &AppState,
    status: StatusCode,
    context: &IndexContext,
) -> Result<Response, AppError> {
    let html = state.templates.render_index(context)?;
    Ok((status, Html(html)).into_response())
}

/// Render a full-page error.
pub(crate) fn render_error_page(
    state: &AppState,
    status: StatusCode,
    title: &str,
    message: &str,
) -> Result<Response, AppError> {
    let html = state.templates.render_error(&ErrorContext {
        title: title.to_string(),
        message: message.to_string(),
    })?;
    Ok((status, Html(html)).into_response())
}

/// The threshold form, pre-filled from the current session if there is one.
#[tracing::instrument(name = "pages.index", skip_all)]
pub async fn index(State(state): State<AppState>, cookies: Cookies) -> Result<Response, AppError> {
    let context = match current_session(&state, &cookies).await? {
        Some(session) => IndexContext::new().with_form(ThresholdForm::from(&session.policy)),
        None => IndexContext::new(),
    };
    render_form(&state, StatusCode::OK, &context)
}

/// Validate the thresholds and send the browser off to sign in.
#[tracing::instrument(name = "pages.connect", skip_all)]
pub async fn connect(
    State(state): State<AppState>,
    cookies: Cookies,
    Form(form): Form<ThresholdForm>,
) -> Result<Response, AppError> {
    let policy = match form.validate() {
        Ok(policy) => policy,
        Err(e) => {
            info!(error = %e, "Rejected thresholds");
            let context = IndexContext::new().with_form(form).with_errors(e.fields);
            return render_form(&state, StatusCode::UNPROCESSABLE_ENTITY, &context);
        }
    };

    let mut session = SweepSession::new(policy, state.config.session.duration());
    // Keep the browser's session id unless a run is still going on under it.
    if let Some(existing) = current_session(&state, &cookies).await?
        && !matches!(existing.stage, Stage::Deleting { .. })
    {
        session.id = existing.id;
    }

    let request_token = match state.twitter.request_token().await {
        Ok(token) => token,
        Err(e) => {
            warn!(error = %e, "Could not obtain a request token");
            return render_error_page(
                &state,
                StatusCode::BAD_GATEWAY,
                "Could not start sign-in",
                "The sign-in service did not respond as expected. Please try again in a moment.",
            );
        }
    };
    let authorize_url = state.twitter.authorize_url(&request_token)?;

    session.stage = Stage::Authorizing { request_token };
    let id = state.sessions.create(session).await?;
    cookies.add(session_cookie(id, &state.config.session));

    info!(session_id = %id, "Redirecting to sign-in");
    Ok(Redirect::to(authorize_url.as_str()).into_response())
}

/// The confirmation page. Only reachable right after sign-in.
#[tracing::instrument(name = "pages.confirm", skip_all)]
pub async fn confirm_page(
    State(state): State<AppState>,
    cookies: Cookies,
) -> Result<Response, AppError> {
    let Some(session) = current_session(&state, &cookies).await? else {
        return Ok(Redirect::to("/").into_response());
    };
    let Stage::Confirming { profile, .. } = session.stage else {
        return Ok(Redirect::to("/").into_response());
    };

    let html = state.templates.render_confirm(&ConfirmContext {
        profile,
        policy: session.policy,
        dry_run: state.config.sweep.dry_run,
    })?;
    Ok(Html(html).into_response())
}

/// Response to `POST /confirm`.
///
/// `matched` is always present. `deleted` and `failed` are only known when
/// the response waits for the deletions to finish.
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub ok: bool,
    pub matched: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<usize>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
}

/// Fetch the timeline, select the posts below the thresholds, and delete
/// them.
///
/// The run itself is a tracked task that outlives this request. The handler
/// waits for the match count, and for the report when
/// `sweep.wait_for_deletions` is set.
#[tracing::instrument(name = "pages.run", skip_all)]
pub async fn run_deletion(
    State(state): State<AppState>,
    cookies: Cookies,
) -> Result<Json<RunResponse>, AppError> {
    let id = session_id(&cookies, &state.config.session).ok_or(AppError::NoSession)?;
    let confirming = state.sessions.begin_run(id).await?;
    let Stage::Confirming {
        credentials,
        profile,
    } = confirming.stage.clone()
    else {
        return Err(SessionError::WrongStage {
            expected: "confirming",
            actual: confirming.stage.name(),
        }
        .into());
    };

    let context = SweepContext {
        credentials,
        policy: confirming.policy,
        settings: state.config.sweep.clone(),
    };
    let dry_run = context.settings.dry_run;
    let wait = context.settings.wait_for_deletions;

    let (matched_tx, matched_rx) = oneshot::channel();
    let (report_tx, report_rx) = oneshot::channel();
    let run = SweepRun {
        sessions: state.sessions.clone(),
        twitter: state.twitter.clone(),
        session: confirming,
        profile,
        context,
    };
    state
        .task_tracker
        .spawn(run.execute(matched_tx, report_tx).in_current_span());

    let matched = matched_rx.await.map_err(|_| AppError::RunAborted)??;
    if !wait {
        return Ok(Json(RunResponse {
            ok: true,
            matched,
            deleted: None,
            failed: None,
            dry_run,
        }));
    }

    let report = report_rx.await.map_err(|_| AppError::RunAborted)?;
    Ok(Json(RunResponse {
        ok: true,
        matched,
        deleted: Some(report.succeeded()),
        failed: Some(report.failed()),
        dry_run,
    }))
}

/// One deletion run, from fetch to report.
struct SweepRun {
    sessions: Arc<dyn SessionStore>,
    twitter: Arc<TwitterClient>,
    /// The session as it was before the run began.
    session: SweepSession,
    profile: Profile,
    context: SweepContext,
}

impl SweepRun {
    async fn execute(
        self,
        matched_tx: oneshot::Sender<Result<usize, SweepError>>,
        report_tx: oneshot::Sender<DeletionReport>,
    ) {
        let Self {
            sessions,
            twitter,
            session,
            profile,
            context,
        } = self;

        let selected = match context.select(twitter.as_ref(), Utc::now()).await {
            Ok(selected) => selected,
            Err(e) => {
                // Back to the confirmation page so the user can retry.
                if let Err(restore) = sessions.update(session).await {
                    warn!(error = %restore, "Could not restore session after failed fetch");
                }
                if let Err(Err(e)) = matched_tx.send(Err(e)) {
                    warn!(error = %e, "Fetch failed after the request went away");
                }
                return;
            }
        };
        let matched = selected.len();

        let mut running = session;
        running.stage = Stage::Deleting {
            credentials: context.credentials.clone(),
            profile: profile.clone(),
            matched: Some(matched),
        };
        if let Err(e) = sessions.update(running.clone()).await {
            warn!(error = %e, "Could not record the match count");
        }
        // The request may be gone; the run carries on regardless.
        let _ = matched_tx.send(Ok(matched));

        let report = context.delete(twitter.as_ref(), &selected).await;
        running.stage = Stage::Finished {
            profile,
            report: report.clone(),
        };
        if let Err(e) = sessions.update(running).await {
            // Logged out mid-run; the report is already in the logs.
            warn!(error = %e, "Could not record the finished run");
        }
        let _ = report_tx.send(report);
    }
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub matched: usize,
    pub deleted: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Response to `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub stage: &'static str,
    pub policy: RetentionPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_name: Option<String>,
    /// Posts selected for deletion, once fetching has finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<DeletionReport>,
}

impl From<SweepSession> for StatusResponse {
    fn from(session: SweepSession) -> Self {
        let stage = session.stage.name();
        let screen_name = session.stage.profile().map(|p| p.screen_name.clone());
        let (matched, report) = match session.stage {
            Stage::Deleting { matched, .. } => (matched, None),
            Stage::Finished { report, .. } => (Some(report.matched()), Some(report)),
            Stage::Configured | Stage::Authorizing { .. } | Stage::Confirming { .. } => {
                (None, None)
            }
        };
        Self {
            stage,
            policy: session.policy,
            screen_name,
            matched,
            summary: report.as_ref().map(|r| RunSummary {
                matched: r.matched(),
                deleted: r.succeeded(),
                failed: r.failed(),
                skipped: r.skipped(),
            }),
            report,
        }
    }
}

/// Where this browser's session is, as JSON.
#[tracing::instrument(name = "pages.status", skip_all)]
pub async fn status(
    State(state): State<AppState>,
    cookies: Cookies,
) -> Result<Json<StatusResponse>, AppError> {
    let session = current_session(&state, &cookies)
        .await?
        .ok_or(AppError::NoSession)?;
    Ok(Json(StatusResponse::from(session)))
}

/// Forget the session and clear the cookie. A run in progress carries on.
#[tracing::instrument(name = "pages.logout", skip_all)]
pub async fn logout(State(state): State<AppState>, cookies: Cookies) -> Result<Response, AppError> {
    if let Some(id) = session_id(&cookies, &state.config.session) {
        state.sessions.delete(id).await?;
        info!(session_id = %id, "Session ended");
    }
    cookies.add(removal_cookie(&state.config.session));
    Ok(Redirect::to("/").into_response())
}
