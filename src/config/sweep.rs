use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Largest page the timeline endpoint will return.
pub const MAX_PAGE_SIZE: u32 = 200;

/// Fetch / delete pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    /// Posts requested per timeline page (1-200).
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Stop paginating after this many pages. 0 = unlimited.
    #[serde(default)]
    pub max_pages: u32,

    /// Overall deadline for the fetch phase in seconds.
    #[serde(default = "default_fetch_deadline")]
    pub fetch_deadline_secs: u64,

    /// Hold the `POST /confirm` response until every deletion has finished
    /// and report the breakdown inline. When false, deletions continue in the
    /// background after the match count is returned.
    #[serde(default)]
    pub wait_for_deletions: bool,

    /// Log what would be deleted without calling the delete endpoint.
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_pages: 0,
            fetch_deadline_secs: default_fetch_deadline(),
            wait_for_deletions: false,
            dry_run: false,
        }
    }
}

impl SweepConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(ConfigError::Validation(format!(
                "sweep.page_size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        if self.fetch_deadline_secs == 0 {
            return Err(ConfigError::Validation(
                "sweep.fetch_deadline_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn fetch_deadline(&self) -> Duration {
        Duration::from_secs(self.fetch_deadline_secs)
    }

    /// `None` when pagination is unbounded.
    pub fn page_limit(&self) -> Option<u32> {
        (self.max_pages > 0).then_some(self.max_pages)
    }
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

fn default_fetch_deadline() -> u64 {
    10 * 60
}
