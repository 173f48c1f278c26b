use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{FederatedSignIn, ProfileRecord, StoreError, UniqueField, UserStore};
use crate::identity::user::{User, compose_full_name};

/// Process-local user store. Uniqueness is checked and the write applied while
/// holding the write lock, so concurrent inserts cannot both succeed.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }

    async fn find_by<F>(&self, predicate: F) -> Option<User>
    where
        F: Fn(&User) -> bool + Send,
    {
        self.users
            .read()
            .await
            .values()
            .find(|user| predicate(user))
            .cloned()
    }
}

/// First unique field `candidate` shares with any user other than itself.
fn conflicting_field(users: &HashMap<Uuid, User>, candidate: &User) -> Option<UniqueField> {
    let others = || users.values().filter(|user| user.id != candidate.id);

    if others().any(|user| user.email == candidate.email) {
        return Some(UniqueField::Email);
    }
    if let Some(username) = candidate.username.as_deref()
        && others().any(|user| user.username.as_deref() == Some(username))
    {
        return Some(UniqueField::Username);
    }
    if let Some(federated_id) = candidate.federated_id.as_deref()
        && others().any(|user| user.federated_id.as_deref() == Some(federated_id))
    {
        return Some(UniqueField::FederatedId);
    }
    if let Some(token) = candidate.verification_token.as_deref()
        && others().any(|user| user.verification_token.as_deref() == Some(token))
    {
        return Some(UniqueField::VerificationToken);
    }
    None
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .find_by(|user| user.username.as_deref() == Some(username))
            .await)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.find_by(|user| user.email == email).await)
    }

    async fn find_by_federated_id(&self, federated_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .find_by(|user| user.federated_id.as_deref() == Some(federated_id))
            .await)
    }

    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "user id {} already exists",
                user.id
            )));
        }
        if let Some(field) = conflicting_field(&users, user) {
            return Err(StoreError::Conflict(field));
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_profile(&self, id: Uuid, profile: &ProfileRecord) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        let Some(current) = users.get(&id) else {
            return Err(StoreError::NotFound);
        };

        let mut candidate = current.clone();
        candidate.email.clone_from(&profile.email);
        candidate.username.clone_from(&profile.username);
        candidate.first_name.clone_from(&profile.first_name);
        candidate.last_name.clone_from(&profile.last_name);
        candidate.full_name.clone_from(&profile.full_name);
        candidate.phone_number.clone_from(&profile.phone_number);

        if let Some(field) = conflicting_field(&users, &candidate) {
            return Err(StoreError::Conflict(field));
        }
        users.insert(id, candidate.clone());
        Ok(candidate)
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.last_login = Some(at);
        Ok(())
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.password_hash = Some(password_hash.to_string());
        Ok(())
    }

    async fn consume_verification_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let mut users = self.users.write().await;
        let holder = users
            .values_mut()
            .find(|user| user.verification_token.as_deref() == Some(token));
        Ok(holder.map(|user| {
            user.email_verified = true;
            user.verification_token = None;
            user.clone()
        }))
    }

    async fn record_federated_login(
        &self,
        id: Uuid,
        sign_in: &FederatedSignIn,
    ) -> Result<Option<User>, StoreError> {
        let mut users = self.users.write().await;
        let Some(current) = users.get(&id) else {
            return Ok(None);
        };
        if current
            .federated_id
            .as_deref()
            .is_some_and(|linked| linked != sign_in.federated_id)
        {
            return Ok(None);
        }

        let mut candidate = current.clone();
        candidate.federated_id = Some(sign_in.federated_id.clone());
        if sign_in.first_name.is_some() || sign_in.last_name.is_some() {
            if let Some(first_name) = &sign_in.first_name {
                candidate.first_name.clone_from(first_name);
            }
            if let Some(last_name) = &sign_in.last_name {
                candidate.last_name.clone_from(last_name);
            }
            candidate.full_name = compose_full_name(&candidate.first_name, &candidate.last_name);
        }
        candidate.last_login = Some(sign_in.at);

        if let Some(field) = conflicting_field(&users, &candidate) {
            return Err(StoreError::Conflict(field));
        }
        users.insert(id, candidate.clone());
        Ok(Some(candidate))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use std::sync::Arc;

    fn user(email: &str) -> User {
        let mut user = User::new(
            email.to_string(),
            "Jane".to_string(),
            "Doe".to_string(),
            Utc::now(),
        );
        user.username = Some(email.to_string());
        user
    }

    #[tokio::test]
    async fn insert_then_lookup() -> anyhow::Result<()> {
        let store = InMemoryUserStore::new();
        let mut jane = user("jane@example.com");
        jane.federated_id = Some("g-1".to_string());
        jane.verification_token = Some("tok".to_string());
        store.insert(&jane).await?;

        assert_eq!(store.find_by_id(jane.id).await?, Some(jane.clone()));
        assert_eq!(store.find_by_email("jane@example.com").await?, Some(jane.clone()));
        assert_eq!(store.find_by_username("jane@example.com").await?, Some(jane.clone()));
        assert_eq!(store.find_by_federated_id("g-1").await?, Some(jane));
        assert_eq!(store.find_by_email("other@example.com").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn insert_conflicts_on_unique_fields() -> anyhow::Result<()> {
        let store = InMemoryUserStore::new();
        store.insert(&user("jane@example.com")).await?;

        let duplicate = user("jane@example.com");
        assert!(matches!(
            store.insert(&duplicate).await,
            Err(StoreError::Conflict(UniqueField::Email))
        ));

        let mut same_username = user("other@example.com");
        same_username.username = Some("jane@example.com".to_string());
        assert!(matches!(
            store.insert(&same_username).await,
            Err(StoreError::Conflict(UniqueField::Username))
        ));
        assert_eq!(store.len().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn update_profile_checks_existence_and_uniqueness() -> anyhow::Result<()> {
        let store = InMemoryUserStore::new();
        let mut jane = user("jane@example.com");
        jane.password_hash = Some("digest".to_string());
        let john = user("john@example.com");
        store.insert(&jane).await?;
        store.insert(&john).await?;

        let mut renamed = ProfileRecord::from(&john);
        renamed.email = "jane@example.com".to_string();
        assert!(matches!(
            store.update_profile(john.id, &renamed).await,
            Err(StoreError::Conflict(UniqueField::Email))
        ));

        assert!(matches!(
            store.update_profile(Uuid::new_v4(), &renamed).await,
            Err(StoreError::NotFound)
        ));

        let mut changed = ProfileRecord::from(&jane);
        changed.first_name = "Janet".to_string();
        let stored = store.update_profile(jane.id, &changed).await?;
        assert_eq!(stored.first_name, "Janet");
        assert_eq!(stored.password_hash.as_deref(), Some("digest"));
        Ok(())
    }

    #[tokio::test]
    async fn narrow_writes_leave_other_columns_alone() -> anyhow::Result<()> {
        let store = InMemoryUserStore::new();
        let mut jane = user("jane@example.com");
        jane.verification_token = Some("tok".to_string());
        store.insert(&jane).await?;

        let at = Utc::now();
        store.set_password_hash(jane.id, "new-digest").await?;
        store.record_login(jane.id, at).await?;

        let stored = store.find_by_id(jane.id).await?.context("stored")?;
        assert_eq!(stored.password_hash.as_deref(), Some("new-digest"));
        assert_eq!(stored.last_login, Some(at));
        assert_eq!(stored.verification_token.as_deref(), Some("tok"));

        assert!(matches!(
            store.record_login(Uuid::new_v4(), at).await,
            Err(StoreError::NotFound)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn verification_token_is_consumed_once() -> anyhow::Result<()> {
        let store = InMemoryUserStore::new();
        let mut jane = user("jane@example.com");
        jane.verification_token = Some("tok".to_string());
        store.insert(&jane).await?;

        let verified = store
            .consume_verification_token("tok")
            .await?
            .context("token holder")?;
        assert!(verified.email_verified);
        assert_eq!(verified.verification_token, None);
        assert_eq!(store.consume_verification_token("tok").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn federated_login_links_once() -> anyhow::Result<()> {
        let store = InMemoryUserStore::new();
        let jane = user("jane@example.com");
        store.insert(&jane).await?;

        let sign_in = FederatedSignIn {
            federated_id: "g-1".to_string(),
            first_name: Some("Janet".to_string()),
            last_name: None,
            at: Utc::now(),
        };
        let linked = store
            .record_federated_login(jane.id, &sign_in)
            .await?
            .context("linked")?;
        assert_eq!(linked.federated_id.as_deref(), Some("g-1"));
        assert_eq!(linked.full_name, "Janet Doe");

        let other = FederatedSignIn {
            federated_id: "g-2".to_string(),
            ..sign_in
        };
        assert_eq!(store.record_federated_login(jane.id, &other).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_inserts_admit_one() {
        let store = Arc::new(InMemoryUserStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut candidate = user("race@example.com");
                candidate.federated_id = Some("g-race".to_string());
                store.insert(&candidate).await.is_ok()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap_or(false) {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(store.len().await, 1);
    }
}
