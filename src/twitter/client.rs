use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use http::{Method, header::AUTHORIZATION};
use tracing::{debug, instrument};
use url::Url;

use super::{Credentials, PageRequest, Post, PostId, Profile, RawPost, RemoteError};
use crate::{
    config::{RetryConfig, TwitterConfig},
    oauth1::{KeyPair, SignableRequest, Signer},
    retry::with_retry,
};

/// The slice of the remote API the sweep pipeline needs.
///
/// Every call is one signed request; implementations keep no per-user state
/// between calls.
#[async_trait]
pub trait TimelineClient: Send + Sync {
    /// Up to `page_size` of the user's posts at or older than the cursor,
    /// newest first.
    async fn fetch_page(
        &self,
        credentials: &Credentials,
        request: &PageRequest,
    ) -> Result<Vec<Post>, RemoteError>;

    /// Delete exactly one post.
    async fn delete_post(&self, credentials: &Credentials, id: &PostId)
    -> Result<(), RemoteError>;
}

/// REST client for the v1.1 API, signing every request with OAuth 1.0a.
#[derive(Debug, Clone)]
pub struct TwitterClient {
    http: reqwest::Client,
    signer: Signer,
    api_base: Url,
    oauth_base: Url,
    callback_url: String,
    retry: RetryConfig,
}

impl TwitterClient {
    pub fn new(config: &TwitterConfig, http: reqwest::Client) -> Result<Self, url::ParseError> {
        Ok(Self {
            http,
            signer: Signer::new(KeyPair::new(
                config.consumer_key.clone(),
                config.consumer_secret.clone(),
            )),
            api_base: base_url(&config.api_base_url)?,
            oauth_base: base_url(&config.oauth_base_url)?,
            callback_url: config.callback_url.clone(),
            retry: config.retry.clone(),
        })
    }

    pub(super) fn callback_url(&self) -> &str {
        &self.callback_url
    }

    pub(super) fn api_url(&self, path: &str) -> Result<Url, RemoteError> {
        Ok(self.api_base.join(path)?)
    }

    pub(super) fn oauth_url(&self, path: &str) -> Result<Url, RemoteError> {
        Ok(self.oauth_base.join(path)?)
    }

    /// Send a signed request, retrying transient failures. Non-2xx responses
    /// become a [`RemoteError`].
    pub(super) async fn send_signed(
        &self,
        operation: &str,
        method: Method,
        url: &Url,
        token: Option<&KeyPair>,
        oauth_params: &[(&str, &str)],
    ) -> Result<reqwest::Response, RemoteError> {
        self.send_signed_counted(operation, method, url, token, oauth_params)
            .await
            .0
    }

    /// [`Self::send_signed`], also returning how many attempts were made.
    async fn send_signed_counted(
        &self,
        operation: &str,
        method: Method,
        url: &Url,
        token: Option<&KeyPair>,
        oauth_params: &[(&str, &str)],
    ) -> (Result<reqwest::Response, RemoteError>, u32) {
        let attempts = AtomicU32::new(0);
        let result = with_retry(&self.retry, operation, || {
            attempts.fetch_add(1, Ordering::Relaxed);
            // Signed per attempt so every retry carries a fresh nonce.
            let authorization = self.signer.authorization_header(&SignableRequest {
                method: &method,
                url,
                token,
                oauth_params,
                body_params: &[],
            });
            self.http
                .request(method.clone(), url.clone())
                .header(AUTHORIZATION, authorization)
                .send()
        })
        .await;

        let result = match result {
            Ok(response) if response.status().is_success() => Ok(response),
            Ok(response) => Err(RemoteError::from_response(response).await),
            Err(e) => Err(RemoteError::from(e)),
        };
        (result, attempts.into_inner())
    }

    /// The signed-in account's profile.
    #[instrument(skip_all, fields(user_id = %credentials.user_id))]
    pub async fn verify_credentials(
        &self,
        credentials: &Credentials,
    ) -> Result<Profile, RemoteError> {
        let mut url = self.api_url("1.1/account/verify_credentials.json")?;
        url.query_pairs_mut()
            .append_pair("skip_status", "true")
            .append_pair("include_entities", "false");

        let response = self
            .send_signed(
                "verify_credentials",
                Method::GET,
                &url,
                Some(&credentials.access),
                &[],
            )
            .await?;

        response
            .json::<Profile>()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

#[async_trait]
impl TimelineClient for TwitterClient {
    #[instrument(
        skip_all,
        fields(
            user_id = %credentials.user_id,
            cursor = request.cursor.as_ref().map(PostId::as_str),
        )
    )]
    async fn fetch_page(
        &self,
        credentials: &Credentials,
        request: &PageRequest,
    ) -> Result<Vec<Post>, RemoteError> {
        let mut url = self.api_url("1.1/statuses/user_timeline.json")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("user_id", &credentials.user_id)
                .append_pair("count", &request.page_size.to_string())
                .append_pair("exclude_replies", bool_param(request.exclude_replies));
            if let Some(cursor) = &request.cursor {
                query.append_pair("max_id", cursor.as_str());
            }
        }

        let response = self
            .send_signed(
                "fetch_page",
                Method::GET,
                &url,
                Some(&credentials.access),
                &[],
            )
            .await?;

        let raw: Vec<RawPost> = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        let posts = raw
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        debug!(count = posts.len(), "Fetched timeline page");
        Ok(posts)
    }

    #[instrument(skip_all, fields(user_id = %credentials.user_id, post_id = %id))]
    async fn delete_post(
        &self,
        credentials: &Credentials,
        id: &PostId,
    ) -> Result<(), RemoteError> {
        let url = self.api_url(&format!("1.1/statuses/destroy/{id}.json"))?;

        let (result, attempts) = self
            .send_signed_counted(
                "delete_post",
                Method::POST,
                &url,
                Some(&credentials.access),
                &[],
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            // An earlier attempt deleted the post but its response was lost.
            Err(RemoteError::Status { status: 404, .. }) if attempts > 1 => {
                debug!(attempts, "Post already gone on retry, counting it as deleted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn bool_param(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

/// Parse a configured base URL so that relative joins append to its path.
fn base_url(raw: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header_exists, method, path, query_param, query_param_is_missing},
    };

    use super::*;

    fn client_for(server: &MockServer) -> TwitterClient {
        let config: TwitterConfig = toml::from_str(&format!(
            r#"
            consumer_key = "ck"
            consumer_secret = "cs"
            callback_url = "http://localhost:3000/auth/callback"
            api_base_url = "{uri}"
            oauth_base_url = "{uri}"

            [retry]
            initial_delay_ms = 1
            max_delay_ms = 5
            jitter = 0.0
            "#,
            uri = server.uri()
        ))
        .unwrap();
        TwitterClient::new(&config, reqwest::Client::new()).unwrap()
    }

    fn credentials() -> Credentials {
        Credentials {
            access: KeyPair::new("at", "as"),
            user_id: "42".into(),
            screen_name: "someone".into(),
        }
    }

    fn tweet(id: &str) -> serde_json::Value {
        serde_json::json!({
            "id_str": id,
            "created_at": "Wed Oct 10 20:19:24 +0000 2018",
            "favorite_count": 1,
            "retweet_count": 0,
            "in_reply_to_status_id_str": null,
        })
    }

    #[test]
    fn test_base_url_appends_trailing_slash() {
        let url = base_url("http://127.0.0.1:9000/proxy").unwrap();
        assert_eq!(
            url.join("1.1/statuses/user_timeline.json").unwrap().as_str(),
            "http://127.0.0.1:9000/proxy/1.1/statuses/user_timeline.json"
        );
    }

    #[tokio::test]
    async fn test_fetch_first_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/1.1/statuses/user_timeline.json"))
            .and(query_param("user_id", "42"))
            .and(query_param("count", "200"))
            .and(query_param("exclude_replies", "true"))
            .and(query_param_is_missing("max_id"))
            .and(header_exists("authorization"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!([tweet("9"), tweet("8")])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let posts = client_for(&server)
            .fetch_page(
                &credentials(),
                &PageRequest {
                    cursor: None,
                    page_size: 200,
                    exclude_replies: true,
                },
            )
            .await
            .unwrap();

        let ids: Vec<_> = posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["9", "8"]);
    }

    #[tokio::test]
    async fn test_fetch_with_cursor_sends_max_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/1.1/statuses/user_timeline.json"))
            .and(query_param("max_id", "8"))
            .and(query_param("exclude_replies", "false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let posts = client_for(&server)
            .fetch_page(
                &credentials(),
                &PageRequest {
                    cursor: Some(PostId::new("8")),
                    page_size: 50,
                    exclude_replies: false,
                },
            )
            .await
            .unwrap();

        assert!(posts.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "errors": [{"code": 89, "message": "Invalid or expired token."}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_page(
                &credentials(),
                &PageRequest {
                    cursor: None,
                    page_size: 200,
                    exclude_replies: true,
                },
            )
            .await
            .unwrap_err();

        assert!(err.is_auth_failure(), "got {err:?}");
    }

    #[tokio::test]
    async fn test_fetch_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_page(
                &credentials(),
                &PageRequest {
                    cursor: None,
                    page_size: 200,
                    exclude_replies: true,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RemoteError::Decode(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_delete_post() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1.1/statuses/destroy/123.json"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tweet("123")))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .delete_post(&credentials(), &PostId::new("123"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_retries_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tweet("5")))
            .mount(&server)
            .await;

        client_for(&server)
            .delete_post(&credentials(), &PostId::new("5"))
            .await
            .unwrap();

        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_gone_after_server_error_counts_as_deleted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "errors": [{"code": 144, "message": "No status found with that ID."}]
            })))
            .mount(&server)
            .await;

        client_for(&server)
            .delete_post(&credentials(), &PostId::new("7"))
            .await
            .unwrap();

        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "errors": [{"code": 144, "message": "No status found with that ID."}]
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .delete_post(&credentials(), &PostId::new("404"))
            .await
            .unwrap_err();

        assert!(
            matches!(err, RemoteError::Status { status: 404, ref message } if message.contains("144"))
        );
    }

    #[tokio::test]
    async fn test_verify_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/1.1/account/verify_credentials.json"))
            .and(query_param("skip_status", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 42,
                "id_str": "42",
                "name": "Some One",
                "screen_name": "someone",
                "profile_image_url_https": "https://pbs.twimg.com/a.png"
            })))
            .mount(&server)
            .await;

        let profile = client_for(&server)
            .verify_credentials(&credentials())
            .await
            .unwrap();

        assert_eq!(profile.screen_name, "someone");
        assert_eq!(profile.name, "Some One");
    }
}
