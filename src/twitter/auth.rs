//! Three-legged OAuth 1.0a sign-in against the provider.
//!
//! 1. [`TwitterClient::request_token`] obtains a temporary token bound to our
//!    callback URL.
//! 2. The browser is sent to [`TwitterClient::authorize_url`].
//! 3. The provider redirects back with `oauth_verifier`, which
//!    [`TwitterClient::access_token`] exchanges for long-lived credentials.

use std::collections::HashMap;

use http::Method;
use tracing::{info, instrument};
use url::Url;

use super::{AuthError, Credentials, RemoteError, TwitterClient};
use crate::oauth1::KeyPair;

impl TwitterClient {
    /// Obtain a request token for a new sign-in.
    #[instrument(skip(self))]
    pub async fn request_token(&self) -> Result<KeyPair, AuthError> {
        let url = self.oauth_url("oauth/request_token")?;
        let response = self
            .send_signed(
                "request_token",
                Method::POST,
                &url,
                None,
                &[("oauth_callback", self.callback_url())],
            )
            .await?;
        let body = response.text().await.map_err(RemoteError::from)?;
        let fields = parse_form(&body);

        if fields.get("oauth_callback_confirmed").map(String::as_str) != Some("true") {
            return Err(AuthError::CallbackNotConfirmed);
        }

        Ok(KeyPair::new(
            required(&fields, "oauth_token")?,
            required(&fields, "oauth_token_secret")?,
        ))
    }

    /// Where to send the browser to approve the request token.
    pub fn authorize_url(&self, request_token: &KeyPair) -> Result<Url, AuthError> {
        let mut url = self.oauth_url("oauth/authenticate")?;
        url.query_pairs_mut()
            .append_pair("oauth_token", &request_token.key);
        Ok(url)
    }

    /// Exchange an approved request token and its verifier for access
    /// credentials.
    #[instrument(skip_all)]
    pub async fn access_token(
        &self,
        request_token: &KeyPair,
        verifier: &str,
    ) -> Result<Credentials, AuthError> {
        let url = self.oauth_url("oauth/access_token")?;
        let response = self
            .send_signed(
                "access_token",
                Method::POST,
                &url,
                Some(request_token),
                &[("oauth_verifier", verifier)],
            )
            .await?;
        let body = response.text().await.map_err(RemoteError::from)?;
        let fields = parse_form(&body);

        let credentials = Credentials {
            access: KeyPair::new(
                required(&fields, "oauth_token")?,
                required(&fields, "oauth_token_secret")?,
            ),
            user_id: required(&fields, "user_id")?,
            screen_name: fields.get("screen_name").cloned().unwrap_or_default(),
        };

        info!(
            user_id = %credentials.user_id,
            screen_name = %credentials.screen_name,
            "Access token issued"
        );
        Ok(credentials)
    }
}

fn parse_form(body: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(body.trim().as_bytes())
        .into_owned()
        .collect()
}

fn required(fields: &HashMap<String, String>, name: &'static str) -> Result<String, AuthError> {
    fields
        .get(name)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or(AuthError::MissingField(name))
}
