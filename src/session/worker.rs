//! Background purge of expired sessions.

use std::{sync::Arc, time::Duration};

use super::SessionStore;

/// Purge expired sessions every `interval` until the task is cancelled.
pub async fn start_session_cleanup_worker(store: Arc<dyn SessionStore>, interval: Duration) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        "Starting session cleanup worker"
    );

    loop {
        tokio::time::sleep(interval).await;

        match store.cleanup().await {
            Ok(0) => tracing::trace!("Session cleanup complete, nothing expired"),
            Ok(removed) => tracing::debug!(removed, "Removed expired sessions"),
            Err(e) => tracing::error!(error = %e, "Error cleaning up sessions"),
        }
    }
}
