//! Session storage.
//!
//! Sessions live in memory only. They are lost on restart and never shared
//! across processes.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    oauth1::KeyPair,
    sweep::{DeletionReport, RetentionPolicy},
    twitter::{Credentials, Profile},
};

/// Result type for session store operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that can occur during session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found")]
    NotFound,

    #[error("A deletion run is already in progress for this session")]
    RunInProgress,

    #[error("Session is {actual}, expected {expected}")]
    WrongStage {
        expected: &'static str,
        actual: &'static str,
    },
}

/// Where a browser session is in the sign-in → confirm → delete flow.
#[derive(Debug, Clone)]
pub enum Stage {
    /// Thresholds accepted, sign-in not started.
    Configured,
    /// Waiting for the provider to redirect back.
    Authorizing { request_token: KeyPair },
    /// Signed in, waiting for the user to confirm.
    Confirming {
        credentials: Credentials,
        profile: Profile,
    },
    /// A run is fetching or deleting. `matched` is known once fetching ends.
    Deleting {
        credentials: Credentials,
        profile: Profile,
        matched: Option<usize>,
    },
    /// The run is over.
    Finished {
        profile: Profile,
        report: DeletionReport,
    },
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Configured => "configured",
            Stage::Authorizing { .. } => "authorizing",
            Stage::Confirming { .. } => "confirming",
            Stage::Deleting { .. } => "deleting",
            Stage::Finished { .. } => "finished",
        }
    }

    pub fn profile(&self) -> Option<&Profile> {
        match self {
            Stage::Confirming { profile, .. }
            | Stage::Deleting { profile, .. }
            | Stage::Finished { profile, .. } => Some(profile),
            Stage::Configured | Stage::Authorizing { .. } => None,
        }
    }
}

/// Per-browser state, keyed by the id in the session cookie.
#[derive(Debug, Clone)]
pub struct SweepSession {
    pub id: Uuid,
    pub policy: RetentionPolicy,
    pub stage: Stage,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SweepSession {
    pub fn new(policy: RetentionPolicy, ttl: std::time::Duration) -> Self {
        let now = Utc::now();
        let ttl = Duration::from_std(ttl).unwrap_or_else(|_| Duration::hours(1));
        Self {
            id: Uuid::new_v4(),
            policy,
            stage: Stage::Configured,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Session storage backend.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store a new session, replacing any with the same id.
    async fn create(&self, session: SweepSession) -> SessionResult<Uuid>;

    /// Get a live session by id. Expired sessions are reported as absent.
    async fn get(&self, id: Uuid) -> SessionResult<Option<SweepSession>>;

    /// Replace an existing session.
    async fn update(&self, session: SweepSession) -> SessionResult<()>;

    /// Delete a session.
    async fn delete(&self, id: Uuid) -> SessionResult<()>;

    /// Atomically move a confirming session into `Deleting`, returning the
    /// session as it was before the move.
    async fn begin_run(&self, id: Uuid) -> SessionResult<SweepSession>;

    /// Remove expired sessions, returning how many were removed. Sessions
    /// with a run in progress are kept for a grace period past expiry so the
    /// run can record its report.
    async fn cleanup(&self) -> SessionResult<usize>;
}

/// In-memory session store.
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<Uuid, SweepSession>>,
    run_grace: Duration,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::with_run_grace(std::time::Duration::from_secs(6 * 60 * 60))
    }

    /// Keep sessions with a run in progress for `grace` past their expiry.
    pub fn with_run_grace(grace: std::time::Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            run_grace: Duration::from_std(grace).unwrap_or(Duration::MAX),
        }
    }

    fn should_keep(&self, session: &SweepSession, now: DateTime<Utc>) -> bool {
        if !session.is_expired(now) {
            return true;
        }
        matches!(session.stage, Stage::Deleting { .. })
            && session
                .expires_at
                .checked_add_signed(self.run_grace)
                .is_none_or(|abandon_at| now < abandon_at)
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: SweepSession) -> SessionResult<Uuid> {
        let id = session.id;
        let mut sessions = self.sessions.write().await;
        sessions.insert(id, session);
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> SessionResult<Option<SweepSession>> {
        let sessions = self.sessions.read().await;
        let now = Utc::now();
        Ok(sessions.get(&id).filter(|s| !s.is_expired(now)).cloned())
    }

    async fn update(&self, session: SweepSession) -> SessionResult<()> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session.id) {
            Some(slot) => {
                *slot = session;
                Ok(())
            }
            None => Err(SessionError::NotFound),
        }
    }

    async fn delete(&self, id: Uuid) -> SessionResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(&id);
        Ok(())
    }

    async fn begin_run(&self, id: Uuid) -> SessionResult<SweepSession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&id)
            .filter(|s| !s.is_expired(Utc::now()))
            .ok_or(SessionError::NotFound)?;

        let (credentials, profile) = match &session.stage {
            Stage::Confirming {
                credentials,
                profile,
            } => (credentials.clone(), profile.clone()),
            Stage::Deleting { .. } => return Err(SessionError::RunInProgress),
            other => {
                return Err(SessionError::WrongStage {
                    expected: "confirming",
                    actual: other.name(),
                });
            }
        };

        let before = session.clone();
        session.stage = Stage::Deleting {
            credentials,
            profile,
            matched: None,
        };
        Ok(before)
    }

    async fn cleanup(&self) -> SessionResult<usize> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| self.should_keep(s, now));
        Ok(before - sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetentionPolicy {
        RetentionPolicy {
            min_likes: 1,
            min_retweets: 1,
            min_age_days: 1,
            include_replies: false,
        }
    }

    fn confirming(mut session: SweepSession) -> SweepSession {
        session.stage = Stage::Confirming {
            credentials: Credentials {
                access: KeyPair::new("t", "s"),
                user_id: "42".into(),
                screen_name: "someone".into(),
            },
            profile: Profile {
                id: "42".into(),
                screen_name: "someone".into(),
                name: "Some One".into(),
                profile_image_url: None,
            },
        };
        session
    }

    fn expired(mut session: SweepSession) -> SweepSession {
        session.expires_at = Utc::now() - Duration::seconds(1);
        session
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let store = MemorySessionStore::new();
        let session = SweepSession::new(policy(), std::time::Duration::from_secs(60));

        let id = store.create(session).await.unwrap();
        let fetched = store.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.stage.name(), "configured");

        store.delete(id).await.unwrap();
        assert!(store.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_absent() {
        let store = MemorySessionStore::new();
        let id = store
            .create(expired(SweepSession::new(
                policy(),
                std::time::Duration::from_secs(60),
            )))
            .await
            .unwrap();

        assert!(store.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_session() {
        let store = MemorySessionStore::new();
        let session = SweepSession::new(policy(), std::time::Duration::from_secs(60));
        assert!(matches!(
            store.update(session).await,
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_begin_run_is_exclusive() {
        let store = MemorySessionStore::new();
        let id = store
            .create(confirming(SweepSession::new(
                policy(),
                std::time::Duration::from_secs(60),
            )))
            .await
            .unwrap();

        let before = store.begin_run(id).await.unwrap();
        assert_eq!(before.stage.name(), "confirming");
        assert_eq!(
            store.get(id).await.unwrap().unwrap().stage.name(),
            "deleting"
        );

        assert!(matches!(
            store.begin_run(id).await,
            Err(SessionError::RunInProgress)
        ));
    }

    #[tokio::test]
    async fn test_begin_run_requires_confirming() {
        let store = MemorySessionStore::new();
        let id = store
            .create(SweepSession::new(policy(), std::time::Duration::from_secs(60)))
            .await
            .unwrap();

        let err = store.begin_run(id).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::WrongStage {
                expected: "confirming",
                actual: "configured"
            }
        ));
    }

    #[tokio::test]
    async fn test_cleanup_keeps_running_sessions() {
        let store = MemorySessionStore::new();
        let ttl = std::time::Duration::from_secs(60);

        let live = store.create(SweepSession::new(policy(), ttl)).await.unwrap();
        let stale = store
            .create(expired(SweepSession::new(policy(), ttl)))
            .await
            .unwrap();
        let running = store
            .create(confirming(SweepSession::new(policy(), ttl)))
            .await
            .unwrap();
        store.begin_run(running).await.unwrap();
        {
            let mut sessions = store.sessions.write().await;
            if let Some(session) = sessions.get_mut(&running) {
                session.expires_at = Utc::now() - Duration::seconds(1);
            }
        }

        assert_eq!(store.cleanup().await.unwrap(), 1);

        let sessions = store.sessions.read().await;
        assert!(sessions.contains_key(&live));
        assert!(!sessions.contains_key(&stale));
        assert!(sessions.contains_key(&running));
    }

    #[tokio::test]
    async fn test_cleanup_drops_abandoned_runs() {
        let store = MemorySessionStore::with_run_grace(std::time::Duration::from_secs(600));
        let ttl = std::time::Duration::from_secs(60);

        let recent = store
            .create(confirming(SweepSession::new(policy(), ttl)))
            .await
            .unwrap();
        let abandoned = store
            .create(confirming(SweepSession::new(policy(), ttl)))
            .await
            .unwrap();
        store.begin_run(recent).await.unwrap();
        store.begin_run(abandoned).await.unwrap();
        {
            let mut sessions = store.sessions.write().await;
            if let Some(session) = sessions.get_mut(&recent) {
                session.expires_at = Utc::now() - Duration::seconds(599);
            }
            if let Some(session) = sessions.get_mut(&abandoned) {
                session.expires_at = Utc::now() - Duration::seconds(601);
            }
        }

        assert_eq!(store.cleanup().await.unwrap(), 1);

        let sessions = store.sessions.read().await;
        assert!(sessions.contains_key(&recent));
        assert!(!sessions.contains_key(&abandoned));
    }
}
