//! Configuration for the sweeper service.
//!
//! The service is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3000
//!
//! [twitter]
//! consumer_key = "${TWITTER_KEY}"
//! consumer_secret = "${TWITTER_SECRET}"
//! callback_url = "http://localhost:3000/auth/callback"
//! ```

mod observability;
mod server;
mod session;
mod sweep;
mod twitter;

use std::path::Path;

pub use observability::*;
use serde::{Deserialize, Serialize};
pub use server::*;
pub use session::*;
pub use sweep::*;
pub use twitter::*;

/// Root configuration.
///
/// Every section has defaults except the consumer credentials, which must be
/// supplied (usually through `${TWITTER_KEY}` / `${TWITTER_SECRET}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweeperConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Remote API and OAuth consumer configuration.
    pub twitter: TwitterConfig,

    /// Browser session configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Fetch / delete pipeline tuning.
    #[serde(default)]
    pub sweep: SweepConfig,

    /// Logging configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl SweeperConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing variables cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let mut config: SweeperConfig = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    fn validate(&mut self) -> Result<(), ConfigError> {
        self.twitter.validate()?;
        self.sweep.validate()?;
        self.session.validate()?;

        if self.session.secure && self.twitter.callback_url.starts_with("http://") {
            tracing::warn!(
                callback_url = %self.twitter.callback_url,
                "session.secure is enabled but the OAuth callback is plain HTTP; \
                 browsers will drop the session cookie on the callback"
            );
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Built-in configuration used when no config file exists.
///
/// Mirrors a bare deployment driven entirely by `TWITTER_KEY`,
/// `TWITTER_SECRET` and `PORT`.
pub fn default_config_toml() -> &'static str {
    r#"# sweeper configuration (built-in default)

[server]
host = "0.0.0.0"
port = ${PORT}

[twitter]
consumer_key = "${TWITTER_KEY}"
consumer_secret = "${TWITTER_SECRET}"
callback_url = "http://localhost:${PORT}/auth/callback"

[session]
secure = false
"#
}

/// Expand environment variables in the format `${VAR_NAME}`.
/// Variables that appear after a `#` on the same line are left untouched.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex");
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let Some(whole) = cap.get(0) else { continue };

            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            result.push_str(&value);

            last_end = whole.end();
        }

        result.push_str(&line[last_end..]);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
