use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally visible base URL, e.g. `https://sweeper.example.com`.
    /// Only used for the startup banner when the service sits behind a proxy.
    #[serde(default)]
    pub public_url: Option<String>,

    /// Request body size limit in bytes. Only small forms are ever posted.
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    /// Directory served under `/static`.
    #[serde(default = "default_static_dir")]
    pub static_dir: String,

    /// Security headers added to every response.
    #[serde(default)]
    pub security_headers: SecurityHeadersConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
            body_limit_bytes: default_body_limit(),
            static_dir: default_static_dir(),
            security_headers: SecurityHeadersConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// URL users should open in a browser.
    pub fn display_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}", self.bind_addr()),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

fn default_port() -> u16 {
    3000
}

fn default_body_limit() -> usize {
    64 * 1024
}

fn default_static_dir() -> String {
    "public".to_string()
}

/// Security headers configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityHeadersConfig {
    /// Master toggle.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// `X-Content-Type-Options` value.
    #[serde(default = "default_content_type_options")]
    pub content_type_options: String,

    /// `X-Frame-Options` value. `None` omits the header.
    #[serde(default = "default_frame_options")]
    pub frame_options: Option<String>,

    /// `Referrer-Policy` value. `None` omits the header.
    #[serde(default = "default_referrer_policy")]
    pub referrer_policy: Option<String>,

    /// `Content-Security-Policy` value. `None` omits the header.
    #[serde(default = "default_content_security_policy")]
    pub content_security_policy: Option<String>,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            content_type_options: default_content_type_options(),
            frame_options: default_frame_options(),
            referrer_policy: default_referrer_policy(),
            content_security_policy: default_content_security_policy(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_content_type_options() -> String {
    "nosniff".to_string()
}

fn default_frame_options() -> Option<String> {
    Some("DENY".to_string())
}

fn default_referrer_policy() -> Option<String> {
    Some("same-origin".to_string())
}

// Profile avatars are loaded from the provider's image CDN.
fn default_content_security_policy() -> Option<String> {
    Some("default-src 'self'; img-src 'self' https:; frame-ancestors 'none'".to_string())
}
