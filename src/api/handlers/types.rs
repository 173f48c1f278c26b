//! Request and response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::identity::User;

#[derive(ToSchema, Deserialize, Debug)]
pub struct SignupRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct SetPasswordRequest {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// OAuth2 password grant form.
#[derive(ToSchema, Deserialize, Debug)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct TokenQuery {
    pub token: Option<String>,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct PasswordResetConfirm {
    pub token: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PasswordResetResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_token: Option<String>,
}

/// Public view of an account; never includes credentials or tokens.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub phone_number: Option<String>,
    pub roles: Vec<String>,
    pub disabled: bool,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            full_name: user.full_name.clone(),
            phone_number: user.phone_number.clone(),
            roles: user.roles.clone(),
            disabled: user.disabled,
            email_verified: user.email_verified,
            created_at: user.created_at,
            last_login: user.last_login,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct GoogleAuthResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserResponse,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn user_response_omits_secrets() {
        let now = Utc.with_ymd_and_hms(2024, 5, 20, 8, 0, 0).unwrap();
        let mut user = User::new(
            "jane@example.com".to_string(),
            "Jane".to_string(),
            "Doe".to_string(),
            now,
        );
        user.password_hash = Some("$argon2id$v=19$secret".to_string());
        user.verification_token = Some("verify-me".to_string());
        user.federated_id = Some("google-sub".to_string());

        let json = serde_json::to_string(&UserResponse::from(&user)).unwrap();
        assert!(json.contains("jane@example.com"));
        assert!(!json.contains("argon2"));
        assert!(!json.contains("verify-me"));
        assert!(!json.contains("google-sub"));
    }

    #[test]
    fn reset_token_is_omitted_when_absent() {
        let body = PasswordResetResponse {
            message: "sent".to_string(),
            reset_token: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("reset_token").is_none());
    }
}
