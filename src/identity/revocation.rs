//! Revoked token identifiers, kept until the token would have expired anyway.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::clock::Clock;

#[async_trait]
pub trait RevocationRegistry: Send + Sync {
    /// Record `jti` as revoked until `expires_at`. Re-revoking overwrites.
    async fn revoke(&self, jti: &str, expires_at: DateTime<Utc>);

    /// Revoke `jti` unless a live entry already exists. True when this call
    /// made the entry.
    async fn revoke_once(&self, jti: &str, expires_at: DateTime<Utc>) -> bool;

    /// True while a live entry exists for `jti`.
    async fn is_revoked(&self, jti: &str) -> bool;

    /// Drop entries whose expiry has passed. Returns how many were removed.
    async fn purge_expired(&self) -> usize;
}

/// Single-instance registry backed by a mutex-guarded map.
#[derive(Debug)]
pub struct InMemoryRevocationRegistry {
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRevocationRegistry {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl RevocationRegistry for InMemoryRevocationRegistry {
    async fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        // Expiry is the purge floor, so anything removed here is already dead.
        entries.retain(|_, expiry| *expiry > now);
        entries.insert(jti.to_string(), expires_at);
    }

    async fn revoke_once(&self, jti: &str, expires_at: DateTime<Utc>) -> bool {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, expiry| *expiry > now);
        if entries.contains_key(jti) {
            return false;
        }
        entries.insert(jti.to_string(), expires_at);
        true
    }

    async fn is_revoked(&self, jti: &str) -> bool {
        let now = self.clock.now();
        self.entries
            .lock()
            .await
            .get(jti)
            .is_some_and(|expiry| *expiry > now)
    }

    async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, expiry| *expiry > now);
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::clock::ManualClock;
    use chrono::{TimeDelta, TimeZone};

    fn setup() -> (Arc<ManualClock>, InMemoryRevocationRegistry) {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let registry = InMemoryRevocationRegistry::new(clock.clone());
        (clock, registry)
    }

    #[tokio::test]
    async fn revoked_until_expiry() {
        let (clock, registry) = setup();
        registry
            .revoke("jti-1", clock.now() + TimeDelta::minutes(10))
            .await;

        assert!(registry.is_revoked("jti-1").await);
        assert!(!registry.is_revoked("jti-2").await);

        clock.advance(TimeDelta::minutes(11));
        assert!(!registry.is_revoked("jti-1").await);
    }

    #[tokio::test]
    async fn revoke_is_idempotent_and_overwrites() {
        let (clock, registry) = setup();
        registry.revoke("jti", clock.now() + TimeDelta::minutes(1)).await;
        registry.revoke("jti", clock.now() + TimeDelta::minutes(30)).await;
        assert_eq!(registry.len().await, 1);

        clock.advance(TimeDelta::minutes(5));
        assert!(registry.is_revoked("jti").await);
    }

    #[tokio::test]
    async fn revoke_once_admits_one_caller() {
        let (clock, registry) = setup();
        let registry = Arc::new(registry);
        let expires_at = clock.now() + TimeDelta::minutes(10);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.revoke_once("reset-jti", expires_at).await
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap_or(false) {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert!(registry.is_revoked("reset-jti").await);

        // A dead entry no longer blocks.
        clock.advance(TimeDelta::minutes(11));
        assert!(registry.revoke_once("reset-jti", clock.now() + TimeDelta::minutes(1)).await);
    }

    #[tokio::test]
    async fn purge_never_drops_live_entries() {
        let (clock, registry) = setup();
        registry.revoke("short", clock.now() + TimeDelta::minutes(1)).await;
        registry.revoke("long", clock.now() + TimeDelta::hours(1)).await;

        assert_eq!(registry.purge_expired().await, 0);

        clock.advance(TimeDelta::minutes(2));
        assert_eq!(registry.purge_expired().await, 1);
        assert!(registry.is_revoked("long").await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn revoke_lazily_purges_dead_entries() {
        let (clock, registry) = setup();
        registry.revoke("old", clock.now() + TimeDelta::seconds(1)).await;
        clock.advance(TimeDelta::seconds(5));
        registry.revoke("new", clock.now() + TimeDelta::hours(1)).await;
        assert_eq!(registry.len().await, 1);
        assert!(!registry.is_empty().await);
    }
}
