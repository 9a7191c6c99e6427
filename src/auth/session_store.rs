//! Server-side login sessions.
//!
//! The browser only holds the session id in a cookie; everything else stays
//! in the store. Sessions are kept in memory, so they do not survive a
//! restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::User;

/// An authenticated login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginSession {
    pub id: Uuid,
    pub user_id: i64,
    pub username: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LoginSession {
    pub fn new(user: &User, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user.id,
            username: user.username.clone(),
            role: user.role.clone(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: LoginSession) -> Uuid;

    /// Get a live session. Expired sessions are removed and reported as absent.
    async fn get_session(&self, id: Uuid) -> Option<LoginSession>;

    async fn delete_session(&self, id: Uuid);

    /// Drop expired sessions, returning how many were removed.
    async fn cleanup(&self) -> usize;
}

/// In-memory session store (single node).
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<Uuid, LoginSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, session: LoginSession) -> Uuid {
        let id = session.id;
        self.sessions.write().await.insert(id, session);
        id
    }

    async fn get_session(&self, id: Uuid) -> Option<LoginSession> {
        let session = self.sessions.read().await.get(&id).cloned();
        match session {
            Some(s) if s.is_expired() => {
                self.sessions.write().await.remove(&id);
                None
            }
            other => other,
        }
    }

    async fn delete_session(&self, id: Uuid) {
        self.sessions.write().await.remove(&id);
    }

    async fn cleanup(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        before - sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 7,
            username: "frontdesk".to_string(),
            full_name: None,
            role: "staff".to_string(),
            is_active: true,
            last_login: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let store = MemorySessionStore::new();
        let session = LoginSession::new(&user(), Duration::hours(1));
        let id = store.create_session(session.clone()).await;

        assert_eq!(store.get_session(id).await, Some(session));

        store.delete_session(id).await;
        assert_eq!(store.get_session(id).await, None);
    }

    #[tokio::test]
    async fn test_expired_session_is_absent() {
        let store = MemorySessionStore::new();
        let session = LoginSession::new(&user(), Duration::seconds(-1));
        let id = store.create_session(session).await;

        assert_eq!(store.get_session(id).await, None);
        assert_eq!(store.cleanup().await, 0);
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_expired() {
        let store = MemorySessionStore::new();
        store
            .create_session(LoginSession::new(&user(), Duration::seconds(-5)))
            .await;
        let live = store
            .create_session(LoginSession::new(&user(), Duration::hours(1)))
            .await;

        assert_eq!(store.cleanup().await, 1);
        assert!(store.get_session(live).await.is_some());
    }
}
