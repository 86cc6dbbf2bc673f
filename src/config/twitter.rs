use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Remote API and OAuth consumer configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TwitterConfig {
    /// OAuth 1.0a consumer key issued to this application.
    pub consumer_key: String,

    /// OAuth 1.0a consumer secret issued to this application.
    pub consumer_secret: String,

    /// Absolute URL the provider redirects to after authorization.
    /// Must route to `GET /auth/callback` on this server.
    pub callback_url: String,

    /// Base URL for REST calls (`/1.1/...`).
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Base URL for the OAuth handshake (`/oauth/...`).
    #[serde(default = "default_oauth_base_url")]
    pub oauth_base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// TCP connect timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// `User-Agent` sent with every remote request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Retry policy for rate-limited and failed requests.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl std::fmt::Debug for TwitterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitterConfig")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"****")
            .field("callback_url", &self.callback_url)
            .field("api_base_url", &self.api_base_url)
            .field("oauth_base_url", &self.oauth_base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("retry", &self.retry)
            .finish()
    }
}

impl TwitterConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.consumer_key.trim().is_empty() || self.consumer_secret.trim().is_empty() {
            return Err(ConfigError::Validation(
                "twitter.consumer_key and twitter.consumer_secret must not be empty".into(),
            ));
        }

        for (name, value) in [
            ("twitter.callback_url", &self.callback_url),
            ("twitter.api_base_url", &self.api_base_url),
            ("twitter.oauth_base_url", &self.oauth_base_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| ConfigError::Validation(format!("{name} is not a valid URL: {e}")))?;
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "twitter.timeout_secs must be greater than 0".into(),
            ));
        }

        self.retry.validate()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Build the shared HTTP client used for every remote call.
    pub fn build_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .timeout(self.timeout())
            .connect_timeout(self.connect_timeout())
            .user_agent(&self.user_agent)
            .build()
    }
}

fn default_api_base_url() -> String {
    "https://api.twitter.com".to_string()
}

fn default_oauth_base_url() -> String {
    "https://api.twitter.com".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    concat!("sweeper/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Retry configuration for remote requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Whether retries are enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of retry attempts (not including the initial request).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial delay before first retry in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds. Also caps any
    /// server-provided rate-limit hint.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (fraction, 0.0-1.0).
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Status codes that should trigger a retry.
    /// Default: 429 (rate limit), 500, 502, 503, 504 (server errors).
    #[serde(default = "default_retryable_status_codes")]
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
            retryable_status_codes: default_retryable_status_codes(),
        }
    }
}

impl RetryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::Validation(
                "twitter.retry.jitter must be between 0.0 and 1.0".into(),
            ));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(ConfigError::Validation(
                "twitter.retry.backoff_multiplier must be at least 1.0".into(),
            ));
        }
        Ok(())
    }

    /// Check if a status code should trigger a retry.
    pub fn should_retry_status(&self, status: u16) -> bool {
        self.enabled && self.retryable_status_codes.contains(&status)
    }

    /// Calculate the delay for a given retry attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            (self.initial_delay_ms as f64) * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let jitter_range = capped_delay * self.jitter;
        let jitter = if jitter_range > 0.0 {
            use rand::Rng;
            rand::thread_rng().gen_range(-jitter_range..jitter_range)
        } else {
            0.0
        };

        let final_delay = (capped_delay + jitter).max(0.0);
        Duration::from_millis(final_delay as u64)
    }

    /// The delay to honor for a server hint, capped at `max_delay_ms`.
    pub fn cap_hint(&self, hint: Duration) -> Duration {
        hint.min(Duration::from_millis(self.max_delay_ms))
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.1
}

fn default_retryable_status_codes() -> Vec<u16> {
    vec![429, 500, 502, 503, 504]
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TwitterConfig {
        toml::from_str(
            r#"
            consumer_key = "ck"
            consumer_secret = "cs"
            callback_url = "http://localhost:3000/auth/callback"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = config();
        assert_eq!(config.api_base_url, "https://api.twitter.com");
        assert_eq!(config.oauth_base_url, "https://api.twitter.com");
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert!(config.user_agent.starts_with("sweeper/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", config());
        assert!(!rendered.contains("\"cs\""));
        assert!(rendered.contains("****"));
    }

    #[test]
    fn test_invalid_callback_url() {
        let config = TwitterConfig {
            callback_url: "not a url".into(),
            ..config()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("twitter.callback_url"));
    }

    #[test]
    fn test_empty_consumer_key() {
        let config = TwitterConfig {
            consumer_key: "  ".into(),
            ..config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_should_retry_status() {
        let config = RetryConfig::default();

        assert!(config.should_retry_status(429));
        assert!(config.should_retry_status(503));
        assert!(!config.should_retry_status(401));
        assert!(!config.should_retry_status(404));
        assert!(!config.should_retry_status(200));

        let disabled = RetryConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(!disabled.should_retry_status(429));
    }

    #[test]
    fn test_delay_for_attempt() {
        let config = RetryConfig {
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            jitter: 0.0,
            ..Default::default()
        };

        assert_eq!(config.delay_for_attempt(0).as_millis(), 100);
        assert_eq!(config.delay_for_attempt(1).as_millis(), 200);
        assert_eq!(config.delay_for_attempt(2).as_millis(), 400);
        assert_eq!(config.delay_for_attempt(10).as_millis(), 1_000);
    }

    #[test]
    fn test_cap_hint() {
        let config = RetryConfig {
            max_delay_ms: 2_000,
            ..Default::default()
        };
        assert_eq!(
            config.cap_hint(Duration::from_secs(900)),
            Duration::from_secs(2)
        );
        assert_eq!(
            config.cap_hint(Duration::from_millis(10)),
            Duration::from_millis(10)
        );
    }

    #[test]
    fn test_invalid_jitter() {
        let config = RetryConfig {
            jitter: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
