//! Request ID middleware for log correlation.
//!
//! Every request gets an id, either taken from an incoming `X-Request-Id`
//! header or freshly generated. It is echoed back in the response headers
//! and copied into JSON error bodies.

use axum::{
    body::Body,
    extract::Request,
    http::header::CONTENT_TYPE,
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::BodyExt;
use tracing::Instrument;
use uuid::Uuid;

/// Header name for the request ID.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Longest incoming id we accept before generating our own.
const MAX_INCOMING_LEN: usize = 128;

/// Request extension holding the id of the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Reuse an id supplied by a proxy, if it is short and printable.
    fn from_header(value: &str) -> Option<Self> {
        let value = value.trim();
        let acceptable = !value.is_empty()
            && value.len() <= MAX_INCOMING_LEN
            && value.chars().all(|c| c.is_ascii_graphic());
        acceptable.then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attach a request id, run the request inside a span carrying it, and
/// echo it back.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(RequestId::from_header)
        .unwrap_or_default();

    req.extensions_mut().insert(request_id.clone());

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    let response = next.run(req).instrument(span).await;
    let mut response = inject_request_id_into_error(response, &request_id).await;

    if let Ok(value) = request_id.as_str().parse() {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

/// Copy the request id into `error.request_id` of JSON error responses.
async fn inject_request_id_into_error(response: Response, request_id: &RequestId) -> Response {
    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return response;
    }

    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    if !is_json {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => return (parts, Body::empty()).into_response(),
    };

    let modified = match serde_json::from_slice::<serde_json::Value>(&bytes) {
        Ok(mut json) => {
            if let Some(error) = json.get_mut("error").and_then(|e| e.as_object_mut()) {
                error.insert(
                    "request_id".to_string(),
                    serde_json::Value::String(request_id.to_string()),
                );
            }
            serde_json::to_vec(&json).unwrap_or_else(|_| bytes.to_vec())
        }
        Err(_) => bytes.to_vec(),
    };

    // The body length changed.
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(modified))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;

    fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
        Response::builder()
            .status(status)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(RequestId::new(), RequestId::new());
    }

    #[test]
    fn test_incoming_header_is_sanitised() {
        assert_eq!(
            RequestId::from_header(" abc-123 ").unwrap().as_str(),
            "abc-123"
        );
        assert!(RequestId::from_header("").is_none());
        assert!(RequestId::from_header("has space").is_none());
        assert!(RequestId::from_header(&"x".repeat(MAX_INCOMING_LEN + 1)).is_none());
    }

    #[tokio::test]
    async fn test_injects_into_error_body() {
        let request_id = RequestId("req-1".into());
        let response = json_response(
            StatusCode::BAD_GATEWAY,
            serde_json::json!({
                "ok": false,
                "error": {"code": "remote_error", "message": "boom"}
            }),
        );

        let modified = inject_request_id_into_error(response, &request_id).await;

        assert_eq!(modified.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(modified).await;
        assert_eq!(json["error"]["request_id"], "req-1");
        assert_eq!(json["error"]["code"], "remote_error");
        assert_eq!(json["ok"], false);
    }

    #[tokio::test]
    async fn test_skips_success_response() {
        let request_id = RequestId("req-1".into());
        let response = json_response(StatusCode::OK, serde_json::json!({"ok": true}));

        let json = body_json(inject_request_id_into_error(response, &request_id).await).await;

        assert_eq!(json, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_skips_html_errors() {
        let request_id = RequestId("req-1".into());
        let response = Response::builder()
            .status(StatusCode::BAD_GATEWAY)
            .header(CONTENT_TYPE, "text/html; charset=utf-8")
            .body(Body::from("<p>Sign-in failed</p>"))
            .unwrap();

        let modified = inject_request_id_into_error(response, &request_id).await;

        let bytes = modified.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(bytes.as_ref(), b"<p>Sign-in failed</p>");
    }
}
