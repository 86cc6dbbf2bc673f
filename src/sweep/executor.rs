use serde::Serialize;
use tracing::{info, warn};

use crate::twitter::{Credentials, Post, PostId, TimelineClient};

/// Outcome of deleting one post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum DeletionResult {
    Deleted,
    Failed(String),
    /// Not attempted because the run was a dry run.
    Skipped,
}

/// Per-post outcomes of one deletion run, in the order they were attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    pub results: Vec<(PostId, DeletionResult)>,
}

impl DeletionReport {
    /// Posts handed to the executor, whatever happened to them.
    pub fn matched(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, r)| *r == DeletionResult::Deleted)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    pub fn skipped(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, r)| *r == DeletionResult::Skipped)
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&PostId, &str)> {
        self.results.iter().filter_map(|(id, r)| match r {
            DeletionResult::Failed(reason) => Some((id, reason.as_str())),
            DeletionResult::Deleted | DeletionResult::Skipped => None,
        })
    }
}

/// Delete posts one at a time, in order.
///
/// Each request completes before the next is sent. A failed deletion is
/// recorded and the run moves on to the next post.
pub async fn delete_all(
    client: &dyn TimelineClient,
    credentials: &Credentials,
    posts: &[Post],
) -> DeletionReport {
    let mut report = DeletionReport {
        results: Vec::with_capacity(posts.len()),
    };

    for post in posts {
        let result = match client.delete_post(credentials, &post.id).await {
            Ok(()) => DeletionResult::Deleted,
            Err(e) => {
                warn!(post_id = %post.id, error = %e, "Failed to delete post");
                DeletionResult::Failed(e.to_string())
            }
        };
        report.results.push((post.id.clone(), result));
    }

    info!(
        matched = report.matched(),
        deleted = report.succeeded(),
        failed = report.failed(),
        "Deletion run finished"
    );
    report
}
