use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RemoteError;
use crate::oauth1::KeyPair;

/// Timestamp layout used by the v1.1 REST API, e.g.
/// `Wed Oct 10 20:19:24 +0000 2018`.
const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Remote identifier of a post. Kept as the decimal string the API returns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One post, as far as retention decisions need it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Post {
    pub id: PostId,
    pub created_at: DateTime<Utc>,
    pub like_count: u64,
    pub retweet_count: u64,
    pub is_reply: bool,
}

/// Timeline entry as it appears on the wire.
#[derive(Debug, Deserialize)]
pub(crate) struct RawPost {
    id_str: String,
    created_at: String,
    #[serde(default)]
    favorite_count: Option<u64>,
    #[serde(default)]
    retweet_count: Option<u64>,
    #[serde(default)]
    in_reply_to_status_id_str: Option<String>,
}

impl TryFrom<RawPost> for Post {
    type Error = RemoteError;

    fn try_from(raw: RawPost) -> Result<Self, Self::Error> {
        let created_at = DateTime::parse_from_str(&raw.created_at, CREATED_AT_FORMAT)
            .map_err(|e| {
                RemoteError::Decode(format!(
                    "post {} has unparseable created_at {:?}: {e}",
                    raw.id_str, raw.created_at
                ))
            })?
            .with_timezone(&Utc);

        Ok(Post {
            id: PostId(raw.id_str),
            created_at,
            like_count: raw.favorite_count.unwrap_or(0),
            retweet_count: raw.retweet_count.unwrap_or(0),
            is_reply: raw.in_reply_to_status_id_str.is_some(),
        })
    }
}

/// Access token bound to one remote account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access: KeyPair,
    pub user_id: String,
    pub screen_name: String,
}

/// The signed-in account, as shown on the confirmation page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    #[serde(rename(deserialize = "id_str"))]
    pub id: String,
    pub screen_name: String,
    pub name: String,
    #[serde(rename(deserialize = "profile_image_url_https"), default)]
    pub profile_image_url: Option<String>,
}

/// Parameters of one timeline page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Return posts at or older than this id. `None` starts from the newest.
    pub cursor: Option<PostId>,
    pub page_size: u32,
    pub exclude_replies: bool,
}
