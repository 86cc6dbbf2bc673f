//! OAuth 1.0a request signing (HMAC-SHA1).
//!
//! Builds the signature base string and the `Authorization` header for a
//! request. The HMAC-SHA1 primitive itself comes from the `hmac` and `sha1`
//! crates.
//!
//! Every parameter that takes part in the signature is percent-encoded with
//! the RFC 3986 unreserved set, sorted by encoded name then encoded value,
//! and joined as `name=value` pairs separated by `&`.

use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use http::Method;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::{Rng, distributions::Alphanumeric};
use sha1::Sha1;
use url::Url;

type HmacSha1 = Hmac<Sha1>;

/// Everything except `ALPHA / DIGIT / "-" / "." / "_" / "~"`.
const RFC3986: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const NONCE_LEN: usize = 32;

/// Percent-encode a string the way OAuth 1.0a requires.
pub fn encode(input: &str) -> String {
    utf8_percent_encode(input, RFC3986).to_string()
}

/// A key/secret pair: either the application's consumer credentials or a
/// request/access token.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub key: String,
    pub secret: String,
}

impl KeyPair {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("key", &self.key)
            .field("secret", &"****")
            .finish()
    }
}

/// Signs requests on behalf of one consumer (application).
#[derive(Debug, Clone)]
pub struct Signer {
    consumer: KeyPair,
}

/// One request to be signed.
///
/// `oauth_params` carries protocol parameters beyond the standard set, such
/// as `oauth_callback` or `oauth_verifier`. `body_params` are the decoded
/// `application/x-www-form-urlencoded` body fields. Query parameters are
/// read from `url`.
#[derive(Debug)]
pub struct SignableRequest<'a> {
    pub method: &'a Method,
    pub url: &'a Url,
    pub token: Option<&'a KeyPair>,
    pub oauth_params: &'a [(&'a str, &'a str)],
    pub body_params: &'a [(&'a str, &'a str)],
}

impl Signer {
    pub fn new(consumer: KeyPair) -> Self {
        Self { consumer }
    }

    /// Build the `Authorization` header value with a fresh nonce and the
    /// current time.
    pub fn authorization_header(&self, request: &SignableRequest<'_>) -> String {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        self.authorization_header_with(request, &generate_nonce(), &timestamp)
    }

    /// Build the `Authorization` header value with a fixed nonce and
    /// timestamp.
    pub fn authorization_header_with(
        &self,
        request: &SignableRequest<'_>,
        nonce: &str,
        timestamp: &str,
    ) -> String {
        let mut oauth: Vec<(&str, &str)> = vec![
            ("oauth_consumer_key", self.consumer.key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", timestamp),
            ("oauth_version", "1.0"),
        ];
        if let Some(token) = request.token {
            oauth.push(("oauth_token", token.key.as_str()));
        }
        oauth.extend_from_slice(request.oauth_params);

        let base = signature_base_string(request, &oauth);
        let signature = self.sign(&base, request.token);

        let mut header: Vec<(String, String)> = oauth
            .iter()
            .map(|(k, v)| (encode(k), encode(v)))
            .collect();
        header.push(("oauth_signature".to_string(), encode(&signature)));
        header.sort();

        let fields = header
            .iter()
            .map(|(k, v)| format!("{k}=\"{v}\""))
            .collect::<Vec<_>>()
            .join(", ");
        format!("OAuth {fields}")
    }

    fn sign(&self, base: &str, token: Option<&KeyPair>) -> String {
        let key = format!(
            "{}&{}",
            encode(&self.consumer.secret),
            token.map(|t| encode(&t.secret)).unwrap_or_default()
        );
        let mut mac =
            HmacSha1::new_from_slice(key.as_bytes()).expect("HMAC accepts any key length");
        mac.update(base.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }
}

/// `METHOD&encoded-base-url&encoded-parameter-string`.
fn signature_base_string(request: &SignableRequest<'_>, oauth: &[(&str, &str)]) -> String {
    let query: Vec<(String, String)> = request
        .url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut params: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .chain(request.body_params.iter().copied())
        .chain(oauth.iter().copied())
        .map(|(k, v)| (encode(k), encode(v)))
        .collect();
    params.sort();

    let param_string = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        request.method.as_str().to_ascii_uppercase(),
        encode(&base_url(request.url)),
        encode(&param_string)
    )
}

/// Scheme, authority and path; no query or fragment. `Url` already
/// lowercases the host and drops default ports.
fn base_url(url: &Url) -> String {
    let mut base = url.clone();
    base.set_query(None);
    base.set_fragment(None);
    base.to_string()
}

fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}
