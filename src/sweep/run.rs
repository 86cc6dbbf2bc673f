use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use super::{
    DeletionReport, DeletionResult, RetentionPolicy, delete_all, fetch_all, select_for_deletion,
};
use crate::{
    config::SweepConfig,
    twitter::{Credentials, Post, RemoteError, TimelineClient},
};

/// Run-level failure. Only the fetch phase can fail a run; deletion failures
/// are recorded per post.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("fetching the timeline took longer than {}s", .0.as_secs())]
    DeadlineExceeded(Duration),
}

/// Everything one deletion run needs, taken from the session that started
/// it.
#[derive(Debug, Clone)]
pub struct SweepContext {
    pub credentials: Credentials,
    pub policy: RetentionPolicy,
    pub settings: SweepConfig,
}

impl SweepContext {
    /// Fetch the whole timeline and pick the posts to delete.
    #[instrument(skip_all, fields(user_id = %self.credentials.user_id))]
    pub async fn select(
        &self,
        client: &dyn TimelineClient,
        now: DateTime<Utc>,
    ) -> Result<Vec<Post>, SweepError> {
        let deadline = self.settings.fetch_deadline();
        let fetched = tokio::time::timeout(
            deadline,
            fetch_all(
                client,
                &self.credentials,
                self.policy.exclude_replies(),
                &self.settings,
            ),
        )
        .await
        .map_err(|_| SweepError::DeadlineExceeded(deadline))??;

        let selected = select_for_deletion(&fetched, &self.policy, now);
        info!(
            fetched = fetched.len(),
            matched = selected.len(),
            min_likes = self.policy.min_likes,
            min_retweets = self.policy.min_retweets,
            min_age_days = self.policy.min_age_days,
            "Selected posts for deletion"
        );
        Ok(selected)
    }

    /// Delete the selected posts, or only record them when `dry_run` is set.
    #[instrument(skip_all, fields(user_id = %self.credentials.user_id, matched = posts.len()))]
    pub async fn delete(&self, client: &dyn TimelineClient, posts: &[Post]) -> DeletionReport {
        if self.settings.dry_run {
            info!("Dry run, no posts will be deleted");
            return DeletionReport {
                results: posts
                    .iter()
                    .map(|p| (p.id.clone(), DeletionResult::Skipped))
                    .collect(),
            };
        }

        delete_all(client, &self.credentials, posts).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::TimeZone;

    use super::*;
    use crate::{
        sweep::paginate::tests::credentials,
        twitter::{PageRequest, PostId},
    };

    /// One page of posts, then a timeline that never answers if `stall` is set.
    struct FakeTimeline {
        posts: Vec<Post>,
        stall: bool,
        deleted: Mutex<Vec<String>>,
    }

    impl FakeTimeline {
        fn new(posts: Vec<Post>) -> Self {
            Self {
                posts,
                stall: false,
                deleted: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TimelineClient for FakeTimeline {
        async fn fetch_page(
            &self,
            _credentials: &Credentials,
            request: &PageRequest,
        ) -> Result<Vec<Post>, RemoteError> {
            if self.stall {
                std::future::pending::<()>().await;
            }
            if request.cursor.is_none() {
                Ok(self.posts.clone())
            } else {
                Ok(Vec::new())
            }
        }

        async fn delete_post(
            &self,
            _credentials: &Credentials,
            id: &PostId,
        ) -> Result<(), RemoteError> {
            self.deleted.lock().unwrap().push(id.to_string());
            Ok(())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn post(id: &str, likes: u64, retweets: u64, age_days: i64) -> Post {
        Post {
            id: PostId::new(id),
            created_at: now() - chrono::Duration::days(age_days),
            like_count: likes,
            retweet_count: retweets,
            is_reply: false,
        }
    }

    fn context(settings: SweepConfig) -> SweepContext {
        SweepContext {
            credentials: credentials(),
            policy: RetentionPolicy {
                min_likes: 5,
                min_retweets: 5,
                min_age_days: 30,
                include_replies: false,
            },
            settings,
        }
    }

    fn scenario_posts() -> Vec<Post> {
        vec![
            post("1", 0, 0, 40),
            post("2", 10, 0, 40),
            post("3", 0, 0, 5),
            post("4", 5, 5, 40),
        ]
    }

    #[tokio::test]
    async fn test_full_run_deletes_only_matches() {
        let client = FakeTimeline::new(scenario_posts());
        let ctx = context(SweepConfig::default());

        let selected = ctx.select(&client, now()).await.unwrap();
        let report = ctx.delete(&client, &selected).await;

        assert_eq!(report.matched(), 1);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(*client.deleted.lock().unwrap(), ["1"]);
    }

    #[tokio::test]
    async fn test_dry_run_deletes_nothing() {
        let client = FakeTimeline::new(scenario_posts());
        let ctx = context(SweepConfig {
            dry_run: true,
            ..Default::default()
        });

        let selected = ctx.select(&client, now()).await.unwrap();
        let report = ctx.delete(&client, &selected).await;

        assert_eq!(report.matched(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.succeeded(), 0);
        assert!(client.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_deadline() {
        let client = FakeTimeline {
            stall: true,
            ..FakeTimeline::new(scenario_posts())
        };
        let ctx = context(SweepConfig {
            fetch_deadline_secs: 1,
            ..Default::default()
        });

        let err = ctx.select(&client, now()).await.unwrap_err();

        assert!(
            matches!(err, SweepError::DeadlineExceeded(d) if d == Duration::from_secs(1)),
            "got {err:?}"
        );
        assert_eq!(err.to_string(), "fetching the timeline took longer than 1s");
        assert!(client.deleted.lock().unwrap().is_empty());
    }
}
