use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;

use crate::types::Session;

/// Maps opaque session ids to authenticated sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the session and marks it as seen. Expired ids resolve to `None`.
    async fn get(&self, id: &str) -> Option<Session>;

    async fn set(&self, session: Session);

    async fn delete(&self, id: &str);
}

/// Process-local store with sliding idle expiry.
pub struct InMemorySessionStore {
    idle_ttl: Duration,
    sessions: DashMap<String, Session>,
}

impl InMemorySessionStore {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            idle_ttl,
            sessions: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn is_idle(&self, session: &Session, now: OffsetDateTime) -> bool {
        now - session.last_seen > self.idle_ttl
    }

    /// Drops every idle session; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !self.is_idle(session, now));
        before.saturating_sub(self.sessions.len())
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: &str) -> Option<Session> {
        let now = OffsetDateTime::now_utc();
        {
            let mut entry = self.sessions.get_mut(id)?;
            if !self.is_idle(&entry, now) {
                entry.last_seen = now;
                return Some(entry.clone());
            }
        }
        self.sessions
            .remove_if(id, |_, session| self.is_idle(session, now));
        None
    }

    async fn set(&self, session: Session) {
        self.sessions.insert(session.id.clone(), session);
    }

    async fn delete(&self, id: &str) {
        self.sessions.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Account;

    fn session() -> Session {
        Session::new(Account {
            home_account_id: "oid.tid".into(),
            tenant_id: "tid".into(),
            username: "ada@contoso.com".into(),
            name: None,
        })
    }

    #[tokio::test]
    async fn set_get_delete() {
        let store = InMemorySessionStore::new(Duration::from_secs(60));
        let session = session();
        let id = session.id.clone();
        store.set(session).await;
        let found = store.get(&id).await.expect("session");
        assert_eq!(found.account.tenant_id, "tid");
        store.delete(&id).await;
        assert!(store.get(&id).await.is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn idle_sessions_expire() {
        let store = InMemorySessionStore::new(Duration::from_millis(20));
        let session = session();
        let id = session.id.clone();
        store.set(session).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.get(&id).await.is_none());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn activity_extends_the_session() {
        let store = InMemorySessionStore::new(Duration::from_millis(150));
        let session = session();
        let id = session.id.clone();
        store.set(session).await;
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(60)).await;
            assert!(store.get(&id).await.is_some());
        }
    }

    #[tokio::test]
    async fn purge_removes_only_idle_sessions() {
        let store = InMemorySessionStore::new(Duration::from_millis(20));
        let stale = session();
        store.set(stale).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        let fresh = session();
        let fresh_id = fresh.id.clone();
        store.set(fresh).await;
        assert_eq!(store.purge_expired(), 1);
        assert!(store.get(&fresh_id).await.is_some());
    }
}
