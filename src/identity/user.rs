//! Account record and the fields a user may change about themselves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

pub const DEFAULT_ROLE: &str = "user";

#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub phone_number: Option<String>,
    pub password_hash: Option<String>,
    pub disabled: bool,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub email_verified: bool,
    pub verification_token: Option<String>,
    pub federated_id: Option<String>,
}

impl User {
    /// Blank account with the default role. Callers fill in credentials.
    #[must_use]
    pub fn new(email: String, first_name: String, last_name: String, now: DateTime<Utc>) -> Self {
        let full_name = compose_full_name(&first_name, &last_name);
        Self {
            id: Uuid::new_v4(),
            email,
            username: None,
            first_name,
            last_name,
            full_name,
            phone_number: None,
            password_hash: None,
            disabled: false,
            roles: vec![DEFAULT_ROLE.to_string()],
            created_at: now,
            last_login: None,
            email_verified: false,
            verification_token: None,
            federated_id: None,
        }
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("username", &self.username)
            .field("full_name", &self.full_name)
            .field("disabled", &self.disabled)
            .field("roles", &self.roles)
            .field("email_verified", &self.email_verified)
            .field("federated_id", &self.federated_id)
            .field("password_hash", &self.password_hash.as_ref().map(|_| "<redacted>"))
            .field(
                "verification_token",
                &self.verification_token.as_ref().map(|_| "<redacted>"),
            )
            .finish_non_exhaustive()
    }
}

#[must_use]
pub fn compose_full_name(first_name: &str, last_name: &str) -> String {
    format!("{first_name} {last_name}").trim().to_string()
}

/// Self-service profile changes. Absent fields are left untouched.
#[derive(Clone, Debug, Default, Deserialize, Serialize, ToSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
}

impl ProfileUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.phone_number.is_none()
            && self.full_name.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_defaults() {
        let user = User::new(
            "jane@example.com".to_string(),
            "Jane".to_string(),
            "Doe".to_string(),
            Utc::now(),
        );
        assert_eq!(user.full_name, "Jane Doe");
        assert_eq!(user.roles, vec![DEFAULT_ROLE.to_string()]);
        assert!(!user.email_verified);
        assert_eq!(user.password_hash, None);
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut user = User::new(
            "jane@example.com".to_string(),
            "Jane".to_string(),
            "Doe".to_string(),
            Utc::now(),
        );
        user.password_hash = Some("$argon2id$secret-digest".to_string());
        user.verification_token = Some("raw-verification-token".to_string());

        let rendered = format!("{user:?}");
        assert!(!rendered.contains("secret-digest"));
        assert!(!rendered.contains("raw-verification-token"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn profile_update_rejects_unknown_fields() {
        let parsed: Result<ProfileUpdate, _> =
            serde_json::from_str(r#"{"first_name":"Jane","roles":["admin"]}"#);
        assert!(parsed.is_err());

        let parsed: Result<ProfileUpdate, _> = serde_json::from_str(r#"{"last_name":"Roe"}"#);
        assert!(parsed.is_ok_and(|update| update.last_name.as_deref() == Some("Roe")));
    }

    #[test]
    fn full_name_trims_missing_parts() {
        assert_eq!(compose_full_name("Jane", ""), "Jane");
        assert_eq!(compose_full_name("", "Doe"), "Doe");
    }
}
