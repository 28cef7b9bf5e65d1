use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Short-lived record of an authorization request waiting for its callback.
#[derive(Clone, Debug)]
pub struct PendingAuth {
    created_at: Instant,
}

/// In-memory store of outstanding `state` values. Each state is claimable once.
pub struct PendingAuthStore {
    ttl: Duration,
    inner: DashMap<String, PendingAuth>,
}

impl PendingAuthStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: DashMap::new(),
        }
    }

    pub fn insert(&self, state: impl Into<String>) {
        self.inner.insert(
            state.into(),
            PendingAuth {
                created_at: Instant::now(),
            },
        );
    }

    pub fn claim(&self, state: &str) -> bool {
        self.inner
            .remove(state)
            .is_some_and(|(_, pending)| !self.is_expired(&pending, Instant::now()))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn is_expired(&self, pending: &PendingAuth, now: Instant) -> bool {
        now.duration_since(pending.created_at) > self.ttl
    }

    /// Drops states whose callback never arrived; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.len();
        self.inner.retain(|_, pending| !self.is_expired(pending, now));
        before.saturating_sub(self.inner.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_claims_before_expiry() {
        let store = PendingAuthStore::new(Duration::from_secs(60));
        store.insert("state");
        assert!(store.claim("state"));
        assert!(!store.claim("state"));
        assert!(!store.claim("never-issued"));
    }

    #[test]
    fn drops_expired_states() {
        let store = PendingAuthStore::new(Duration::from_millis(5));
        store.insert("state");
        std::thread::sleep(Duration::from_millis(10));
        assert!(!store.claim("state"));
    }

    #[test]
    fn purge_drops_abandoned_states() {
        let store = PendingAuthStore::new(Duration::from_millis(5));
        for i in 0..1000 {
            store.insert(format!("abandoned-{i}"));
        }
        std::thread::sleep(Duration::from_millis(20));
        store.insert("fresh");

        assert_eq!(store.purge_expired(), 1000);
        assert_eq!(store.len(), 1);
        assert!(store.claim("fresh"));
        assert!(store.is_empty());
    }
}
