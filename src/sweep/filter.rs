use chrono::{DateTime, Duration, Utc};

use super::RetentionPolicy;
use crate::twitter::Post;

/// Posts that fall below every threshold, in input order.
///
/// A post is selected when it has fewer retweets than `min_retweets`, fewer
/// likes than `min_likes`, and is at least `min_age_days` old. Reaching an
/// engagement threshold exactly keeps the post; reaching the age threshold
/// exactly makes it eligible. An age threshold reaching back past the
/// earliest representable date selects nothing.
pub fn select_for_deletion(
    posts: &[Post],
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Vec<Post> {
    let Some(cutoff) = Duration::try_days(i64::from(policy.min_age_days))
        .and_then(|age| now.checked_sub_signed(age))
    else {
        return Vec::new();
    };

    posts
        .iter()
        .filter(|post| {
            post.retweet_count < u64::from(policy.min_retweets)
                && post.like_count < u64::from(policy.min_likes)
                && post.created_at <= cutoff
        })
        .cloned()
        .collect()
}
