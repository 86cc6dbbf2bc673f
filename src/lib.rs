//! Sweeper: sign in with a social account, pick engagement and age
//! thresholds, and bulk-delete the posts that fall below them.

use std::sync::Arc;

use axum::{
    Router,
    http::header,
    routing::{get, post},
};
use tokio_util::task::TaskTracker;
use tower_http::{
    limit::RequestBodyLimitLayer, services::ServeDir, set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

pub mod config;
pub mod middleware;
pub mod oauth1;
pub mod observability;
pub mod retry;
pub mod routes;
pub mod session;
pub mod sweep;
pub mod templates;
pub mod twitter;

#[cfg(test)]
mod tests;

use config::SweeperConfig;
use session::{MemorySessionStore, SessionStore};
use templates::{TemplateError, Templates};
use twitter::TwitterClient;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SweeperConfig>,
    pub twitter: Arc<TwitterClient>,
    pub sessions: Arc<dyn SessionStore>,
    pub templates: Arc<Templates>,
    /// Background deletion runs. Shutdown waits on it.
    pub task_tracker: TaskTracker,
}

/// Failure to assemble the application at startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Invalid remote API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

impl AppState {
    /// Build the state with an in-memory session store.
    pub fn new(config: SweeperConfig) -> Result<Self, StartupError> {
        let http = config.twitter.build_client()?;
        let twitter = TwitterClient::new(&config.twitter, http)?;
        let sessions = MemorySessionStore::with_run_grace(config.session.run_grace());

        Ok(Self {
            config: Arc::new(config),
            twitter: Arc::new(twitter),
            sessions: Arc::new(sessions),
            templates: Arc::new(Templates::load()?),
            task_tracker: TaskTracker::new(),
        })
    }
}

pub fn build_app(state: AppState) -> Router {
    let config = state.config.clone();

    let static_files = tower::ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            header::HeaderValue::from_static("public, max-age=3600"),
        ))
        .service(ServeDir::new(&config.server.static_dir));

    Router::new()
        .route("/", get(routes::pages::index))
        .route("/connect", post(routes::pages::connect))
        .route(
            "/confirm",
            get(routes::pages::confirm_page).post(routes::pages::run_deletion),
        )
        .route("/status", get(routes::pages::status))
        .route("/logout", post(routes::pages::logout))
        .route("/auth/callback", get(routes::auth::callback))
        .route("/health", get(routes::health::health_check))
        .route("/health/live", get(routes::health::liveness))
        .nest_service("/static", static_files)
        .layer(axum::middleware::from_fn(
            middleware::request_id_middleware,
        ))
        .layer(tower_cookies::CookieManagerLayer::new())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::security_headers_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.server.body_limit_bytes))
        .with_state(state)
}
