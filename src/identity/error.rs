//! Error taxonomy for identity operations.

use thiserror::Error;

use super::store::{StoreError, UniqueField};

/// Coarse classification used by the transport layer to pick a status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    Authentication,
    NotFound,
    Upstream,
    Internal,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("email already registered")]
    EmailTaken,
    #[error("federated identity already linked to another account")]
    FederatedIdTaken,
    #[error("invalid email address")]
    InvalidEmail,
    #[error("invalid phone number format")]
    InvalidPhone,
    #[error("passwords do not match")]
    PasswordMismatch,
    #[error("weak password: {0}")]
    WeakPassword(&'static str),
    #[error("signup was not started for this email")]
    SignupNotStarted,
    #[error("incorrect username or password")]
    InvalidCredentials,
    #[error("account is disabled")]
    AccountDisabled,
    #[error("invalid token")]
    InvalidToken,
    #[error("malformed token")]
    MalformedToken,
    #[error("not a refresh token")]
    NotARefreshToken,
    #[error("token has been revoked")]
    TokenRevoked,
    #[error("token was issued for a different purpose")]
    WrongPurpose,
    #[error("user not found")]
    UserNotFound,
    #[error("invalid verification token")]
    InvalidVerificationToken,
    #[error("invalid federated identity token")]
    InvalidFederatedToken,
    #[error("federated identity verification timed out")]
    VerificationTimeout,
    #[error("federated identity provider unavailable")]
    FederatedUnavailable,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IdentityError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidEmail
            | Self::InvalidPhone
            | Self::PasswordMismatch
            | Self::WeakPassword(_) => ErrorKind::Validation,
            Self::EmailTaken | Self::FederatedIdTaken => ErrorKind::Conflict,
            Self::InvalidCredentials
            | Self::AccountDisabled
            | Self::InvalidToken
            | Self::MalformedToken
            | Self::NotARefreshToken
            | Self::TokenRevoked
            | Self::WrongPurpose
            | Self::InvalidFederatedToken => ErrorKind::Authentication,
            Self::UserNotFound | Self::InvalidVerificationToken | Self::SignupNotStarted => {
                ErrorKind::NotFound
            }
            Self::VerificationTimeout | Self::FederatedUnavailable => ErrorKind::Upstream,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<StoreError> for IdentityError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(UniqueField::Email) => Self::EmailTaken,
            StoreError::Conflict(UniqueField::FederatedId) => Self::FederatedIdTaken,
            // Callers that can collide on these handle the conflict themselves.
            StoreError::Conflict(field @ (UniqueField::Username | UniqueField::VerificationToken)) => {
                Self::Internal(anyhow::anyhow!("unexpected {field} collision"))
            }
            StoreError::NotFound => Self::UserNotFound,
            StoreError::Backend(err) => Self::Internal(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(IdentityError::WeakPassword("x").kind(), ErrorKind::Validation);
        assert_eq!(IdentityError::EmailTaken.kind(), ErrorKind::Conflict);
        assert_eq!(IdentityError::TokenRevoked.kind(), ErrorKind::Authentication);
        assert_eq!(IdentityError::SignupNotStarted.kind(), ErrorKind::NotFound);
        assert_eq!(IdentityError::VerificationTimeout.kind(), ErrorKind::Upstream);
        assert_eq!(
            IdentityError::Internal(anyhow::anyhow!("boom")).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn store_conflicts_map_to_field_errors() {
        assert!(matches!(
            IdentityError::from(StoreError::Conflict(UniqueField::Email)),
            IdentityError::EmailTaken
        ));
        assert!(matches!(
            IdentityError::from(StoreError::Conflict(UniqueField::Username)),
            IdentityError::Internal(_)
        ));
        assert!(matches!(
            IdentityError::from(StoreError::NotFound),
            IdentityError::UserNotFound
        ));
    }
}
