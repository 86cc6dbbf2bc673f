//! The session cookie: a random UUID naming a server-side [`SweepSession`].

use tower_cookies::{
    Cookie, Cookies,
    cookie::{SameSite as CookieSameSite, time::Duration as CookieDuration},
};
use uuid::Uuid;

use crate::{
    AppState,
    config::SessionConfig,
    session::{SessionResult, SweepSession},
};

/// Cookie carrying a session id, valid for the configured session duration.
pub(crate) fn session_cookie(id: Uuid, config: &SessionConfig) -> Cookie<'static> {
    let max_age = i64::try_from(config.duration_secs).unwrap_or(i64::MAX);
    base_cookie(config, id.to_string())
        .max_age(CookieDuration::seconds(max_age))
        .build()
}

/// Cookie that clears the session, with the same attributes as the real one.
pub(crate) fn removal_cookie(config: &SessionConfig) -> Cookie<'static> {
    base_cookie(config, String::new())
        .max_age(CookieDuration::ZERO)
        .build()
}

fn base_cookie(config: &SessionConfig, value: String) -> tower_cookies::cookie::CookieBuilder<'static> {
    Cookie::build((config.cookie_name.clone(), value))
        .path("/")
        .http_only(true)
        .secure(config.secure)
        .same_site(CookieSameSite::from(config.same_site))
}

/// Session id named by the request's cookie, if it is well-formed.
pub(crate) fn session_id(cookies: &Cookies, config: &SessionConfig) -> Option<Uuid> {
    cookies
        .get(&config.cookie_name)
        .and_then(|c| Uuid::parse_str(c.value()).ok())
}

/// The live session for this browser, if any.
pub(crate) async fn current_session(
    state: &AppState,
    cookies: &Cookies,
) -> SessionResult<Option<SweepSession>> {
    match session_id(cookies, &state.config.session) {
        Some(id) => state.sessions.get(id).await,
        None => Ok(None),
    }
}
