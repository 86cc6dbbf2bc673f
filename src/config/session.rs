use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Browser session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Cookie name.
    #[serde(default = "default_session_cookie")]
    pub cookie_name: String,

    /// Session duration in seconds.
    #[serde(default = "default_session_duration")]
    pub duration_secs: u64,

    /// Secure cookie (HTTPS only).
    #[serde(default = "default_true")]
    pub secure: bool,

    /// SameSite cookie attribute. `strict` breaks the OAuth callback
    /// redirect, which arrives from the provider's domain.
    #[serde(default)]
    pub same_site: SameSite,

    /// How often expired sessions are purged, in seconds.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// How long past expiry a session with a run still in progress is kept,
    /// in seconds. A run that has not finished by then is abandoned.
    #[serde(default = "default_run_grace")]
    pub run_grace_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_session_cookie(),
            duration_secs: default_session_duration(),
            secure: true,
            same_site: SameSite::default(),
            cleanup_interval_secs: default_cleanup_interval(),
            run_grace_secs: default_run_grace(),
        }
    }
}

impl SessionConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.cookie_name.is_empty() {
            return Err(ConfigError::Validation(
                "session.cookie_name must not be empty".into(),
            ));
        }
        if self.duration_secs == 0 {
            return Err(ConfigError::Validation(
                "session.duration_secs must be greater than 0".into(),
            ));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "session.cleanup_interval_secs must be greater than 0".into(),
            ));
        }
        if self.same_site == SameSite::None && !self.secure {
            return Err(ConfigError::Validation(
                "session.same_site = \"none\" requires session.secure = true".into(),
            ));
        }
        Ok(())
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn run_grace(&self) -> Duration {
        Duration::from_secs(self.run_grace_secs)
    }
}

fn default_session_cookie() -> String {
    "sweeper_session".to_string()
}

fn default_session_duration() -> u64 {
    60 * 60
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_run_grace() -> u64 {
    6 * 60 * 60
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    #[default]
    Lax,
    Strict,
    None,
}

impl From<SameSite> for tower_cookies::cookie::SameSite {
    fn from(value: SameSite) -> Self {
        match value {
            SameSite::Lax => Self::Lax,
            SameSite::Strict => Self::Strict,
            SameSite::None => Self::None,
        }
    }
}
