//! Persistent user storage.
//!
//! Uniqueness of email, username, federated id and verification token is the
//! store's job: both implementations reject a conflicting write atomically.
//!
//! Writes are narrow. Each one touches only the columns its operation owns, so
//! concurrent operations on the same account never overwrite each other.

mod memory;
mod postgres;

pub use memory::InMemoryUserStore;
pub use postgres::PgUserStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use super::user::User;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    Username,
    FederatedId,
    VerificationToken,
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Email => "email",
            Self::Username => "username",
            Self::FederatedId => "federated_id",
            Self::VerificationToken => "verification_token",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated on {0}")]
    Conflict(UniqueField),
    #[error("record not found")]
    NotFound,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Columns a self-service profile change writes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileRecord {
    pub email: String,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub phone_number: Option<String>,
}

impl From<&User> for ProfileRecord {
    fn from(user: &User) -> Self {
        Self {
            email: user.email.clone(),
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            full_name: user.full_name.clone(),
            phone_number: user.phone_number.clone(),
        }
    }
}

/// A federated sign-in: link the identity if none is linked, refresh names.
///
/// `None` names are left as stored. `full_name` is recomputed from the first
/// and last name only when one of them is given.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FederatedSignIn {
    pub federated_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub at: DateTime<Utc>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Expects a normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_federated_id(&self, federated_id: &str) -> Result<Option<User>, StoreError>;

    /// Create a user in one atomic write.
    async fn insert(&self, user: &User) -> Result<(), StoreError>;

    /// Write the profile columns and return the stored account.
    async fn update_profile(&self, id: Uuid, profile: &ProfileRecord) -> Result<User, StoreError>;

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> Result<(), StoreError>;

    /// Mark the holder of `token` verified and clear the token in one write.
    /// `None` when no account holds it.
    async fn consume_verification_token(&self, token: &str) -> Result<Option<User>, StoreError>;

    /// `None` when the account is gone or already linked to another identity.
    async fn record_federated_login(
        &self,
        id: Uuid,
        sign_in: &FederatedSignIn,
    ) -> Result<Option<User>, StoreError>;

    /// Cheap liveness check for health endpoints.
    async fn ping(&self) -> Result<(), StoreError>;
}
