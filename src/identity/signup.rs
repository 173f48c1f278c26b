//! Profile fields collected by signup step 1, held until step 2 consumes them.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::clock::Clock;

const DEFAULT_SIGNUP_TTL_SECONDS: i64 = 30 * 60;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignupProfile {
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
}

#[async_trait]
pub trait SignupSessionStore: Send + Sync {
    /// Insert or replace the pending profile for `email`.
    async fn put(&self, email: &str, profile: SignupProfile);

    /// Atomically remove and return the pending profile for `email`.
    async fn take(&self, email: &str) -> Option<SignupProfile>;

    /// Drop sessions older than the retention window. Returns how many were removed.
    async fn purge_expired(&self) -> usize;
}

#[derive(Debug)]
struct PendingSignup {
    profile: SignupProfile,
    created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct InMemorySignupStore {
    sessions: Mutex<HashMap<String, PendingSignup>>,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl InMemorySignupStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl: TimeDelta::seconds(DEFAULT_SIGNUP_TTL_SECONDS),
            clock,
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: TimeDelta) -> Self {
        self.ttl = ttl;
        self
    }

    fn is_live(&self, pending: &PendingSignup, now: DateTime<Utc>) -> bool {
        now - pending.created_at < self.ttl
    }
}

#[async_trait]
impl SignupSessionStore for InMemorySignupStore {
    async fn put(&self, email: &str, profile: SignupProfile) {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().await;
        sessions.retain(|_, pending| self.is_live(pending, now));
        sessions.insert(
            email.to_string(),
            PendingSignup {
                profile,
                created_at: now,
            },
        );
    }

    async fn take(&self, email: &str) -> Option<SignupProfile> {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().await;
        sessions
            .remove(email)
            .filter(|pending| self.is_live(pending, now))
            .map(|pending| pending.profile)
    }

    async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, pending| self.is_live(pending, now));
        before - sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::clock::ManualClock;
    use chrono::TimeZone;

    fn profile(first: &str) -> SignupProfile {
        SignupProfile {
            first_name: first.to_string(),
            last_name: "Doe".to_string(),
            phone_number: Some("+254712345678".to_string()),
        }
    }

    fn setup() -> (Arc<ManualClock>, InMemorySignupStore) {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = InMemorySignupStore::new(clock.clone()).with_ttl(TimeDelta::minutes(10));
        (clock, store)
    }

    #[tokio::test]
    async fn take_consumes_the_session() {
        let (_clock, store) = setup();
        store.put("jane@example.com", profile("Jane")).await;

        assert_eq!(store.take("jane@example.com").await, Some(profile("Jane")));
        assert_eq!(store.take("jane@example.com").await, None);
    }

    #[tokio::test]
    async fn put_overwrites_previous_profile() {
        let (_clock, store) = setup();
        store.put("jane@example.com", profile("Jane")).await;
        store.put("jane@example.com", profile("Janet")).await;

        assert_eq!(store.take("jane@example.com").await, Some(profile("Janet")));
    }

    #[tokio::test]
    async fn expired_sessions_are_not_returned() {
        let (clock, store) = setup();
        store.put("jane@example.com", profile("Jane")).await;
        clock.advance(TimeDelta::minutes(11));

        assert_eq!(store.take("jane@example.com").await, None);
    }

    #[tokio::test]
    async fn purge_removes_only_stale_sessions() {
        let (clock, store) = setup();
        store.put("old@example.com", profile("Old")).await;
        clock.advance(TimeDelta::minutes(8));
        store.put("new@example.com", profile("New")).await;
        clock.advance(TimeDelta::minutes(3));

        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.take("new@example.com").await, Some(profile("New")));
    }

    #[tokio::test]
    async fn concurrent_takes_yield_one_winner() {
        let (_clock, store) = setup();
        let store = Arc::new(store);
        store.put("race@example.com", profile("Race")).await;

        let first = tokio::spawn({
            let store = store.clone();
            async move { store.take("race@example.com").await }
        });
        let second = tokio::spawn({
            let store = store.clone();
            async move { store.take("race@example.com").await }
        });

        let (first, second) = (first.await.unwrap(), second.await.unwrap());
        assert_eq!(usize::from(first.is_some()) + usize::from(second.is_some()), 1);
    }
}
