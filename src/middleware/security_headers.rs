//! Security headers middleware.
//!
//! The pages only load their own script and stylesheet plus remote avatar
//! images, so a strict CSP and `DENY` framing are the defaults.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header::HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::{AppState, config::SecurityHeadersConfig};

/// Add the configured security headers to every response.
pub async fn security_headers_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    apply_security_headers(&state.config.server.security_headers, response.headers_mut());
    response
}

fn apply_security_headers(config: &SecurityHeadersConfig, headers: &mut HeaderMap) {
    if !config.enabled {
        return;
    }

    if let Some(value) = try_header_value(&config.content_type_options) {
        headers.insert("x-content-type-options", value);
    }

    if let Some(value) = config.frame_options.as_deref().and_then(try_header_value) {
        headers.insert("x-frame-options", value);
    }

    if let Some(value) = config
        .content_security_policy
        .as_deref()
        .and_then(try_header_value)
    {
        headers.insert("content-security-policy", value);
    }

    if let Some(value) = config.referrer_policy.as_deref().and_then(try_header_value) {
        headers.insert("referrer-policy", value);
    }
}

/// `None` for empty or invalid values, which are skipped.
fn try_header_value(s: &str) -> Option<HeaderValue> {
    if s.is_empty() {
        return None;
    }
    HeaderValue::try_from(s).ok()
}
