//! The identity state machine: signup, sessions, federated login, password
//! reset and profile changes.

use anyhow::Context;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::{fmt, str::FromStr, sync::Arc};
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    clock::Clock,
    error::IdentityError,
    federated::{FederatedIdentity, FederatedIdentityVerifier, VerificationError},
    hasher::CredentialHasher,
    policy::{
        check_password_strength, federated_username, generate_verification_token,
        normalize_email, valid_email, valid_phone,
    },
    revocation::RevocationRegistry,
    signup::{SignupProfile, SignupSessionStore},
    store::{FederatedSignIn, ProfileRecord, StoreError, UniqueField, UserStore},
    token::{Grant, IssuedToken, TokenClaims, TokenCodec, TokenPurpose},
    user::{ProfileUpdate, User, compose_full_name},
};

const DEFAULT_ACCESS_TOKEN_TTL_MINUTES: i64 = 30;
const DEFAULT_REFRESH_TOKEN_TTL_DAYS: i64 = 7;
const DEFAULT_PASSWORD_RESET_TTL_SECONDS: i64 = 60 * 60;
const FEDERATED_LINK_ATTEMPTS: usize = 3;

pub const SIGNUP_STARTED_MESSAGE: &str = "User information collected";
pub const PASSWORD_RESET_MESSAGE: &str = "If the email exists, a reset link has been sent";
pub const TOKEN_TYPE: &str = "bearer";

/// What step 2 of signup does when step 1 never happened (or expired).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MissingSignupPolicy {
    #[default]
    Reject,
    /// Create the account with placeholder names.
    DefaultProfile,
}

impl FromStr for MissingSignupPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "default-profile" | "default_profile" => Ok(Self::DefaultProfile),
            other => Err(format!("unknown missing signup policy: {other}")),
        }
    }
}

impl fmt::Display for MissingSignupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reject => f.write_str("reject"),
            Self::DefaultProfile => f.write_str("default-profile"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct IdentityConfig {
    access_token_ttl: TimeDelta,
    refresh_token_ttl: TimeDelta,
    password_reset_ttl: TimeDelta,
    missing_signup_policy: MissingSignupPolicy,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            access_token_ttl: TimeDelta::minutes(DEFAULT_ACCESS_TOKEN_TTL_MINUTES),
            refresh_token_ttl: TimeDelta::days(DEFAULT_REFRESH_TOKEN_TTL_DAYS),
            password_reset_ttl: TimeDelta::seconds(DEFAULT_PASSWORD_RESET_TTL_SECONDS),
            missing_signup_policy: MissingSignupPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_access_token_ttl_minutes(mut self, minutes: i64) -> Self {
        self.access_token_ttl = TimeDelta::minutes(minutes);
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl_days(mut self, days: i64) -> Self {
        self.refresh_token_ttl = TimeDelta::days(days);
        self
    }

    #[must_use]
    pub fn with_password_reset_ttl_seconds(mut self, seconds: i64) -> Self {
        self.password_reset_ttl = TimeDelta::seconds(seconds);
        self
    }

    #[must_use]
    pub fn with_missing_signup_policy(mut self, policy: MissingSignupPolicy) -> Self {
        self.missing_signup_policy = policy;
        self
    }

    #[must_use]
    pub fn access_token_ttl(&self) -> TimeDelta {
        self.access_token_ttl
    }

    #[must_use]
    pub fn refresh_token_ttl(&self) -> TimeDelta {
        self.refresh_token_ttl
    }

    #[must_use]
    pub fn password_reset_ttl(&self) -> TimeDelta {
        self.password_reset_ttl
    }

    #[must_use]
    pub fn missing_signup_policy(&self) -> MissingSignupPolicy {
        self.missing_signup_policy
    }
}

/// Shared collaborators, created once at startup.
#[derive(Clone)]
pub struct IdentityBackends {
    pub users: Arc<dyn UserStore>,
    pub revocations: Arc<dyn RevocationRegistry>,
    pub signups: Arc<dyn SignupSessionStore>,
    pub federated: Arc<dyn FederatedIdentityVerifier>,
}

#[derive(Clone, Debug, Serialize, ToSchema, PartialEq, Eq)]
pub struct SignupAck {
    pub message: String,
    pub email: String,
}

#[derive(Clone, Debug, Serialize, ToSchema, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct FederatedLogin {
    pub user: User,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Same message whether or not the email matched an account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PasswordResetAck {
    pub message: String,
    pub reset_token: Option<String>,
}

pub struct IdentityService {
    config: IdentityConfig,
    codec: TokenCodec,
    hasher: CredentialHasher,
    users: Arc<dyn UserStore>,
    revocations: Arc<dyn RevocationRegistry>,
    signups: Arc<dyn SignupSessionStore>,
    federated: Arc<dyn FederatedIdentityVerifier>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for IdentityService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityService")
            .field("config", &self.config)
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

impl IdentityService {
    #[must_use]
    pub fn new(
        config: IdentityConfig,
        codec: TokenCodec,
        hasher: CredentialHasher,
        backends: IdentityBackends,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            codec,
            hasher,
            users: backends.users,
            revocations: backends.revocations,
            signups: backends.signups,
            federated: backends.federated,
            clock,
        }
    }

    #[must_use]
    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    /// Store liveness, for health checks.
    ///
    /// # Errors
    /// Returns an error if the user store cannot be reached.
    pub async fn ping_store(&self) -> Result<(), IdentityError> {
        Ok(self.users.ping().await?)
    }

    /// Signup step 1: remember the profile fields until a password is set.
    ///
    /// # Errors
    /// `InvalidEmail`, `EmailTaken` or `InvalidPhone`.
    #[instrument(skip(self, first_name, last_name, phone_number))]
    pub async fn begin_signup(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        phone_number: Option<&str>,
    ) -> Result<SignupAck, IdentityError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(IdentityError::InvalidEmail);
        }
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(IdentityError::EmailTaken);
        }

        let phone_number = clean_optional(phone_number);
        if let Some(phone) = phone_number.as_deref()
            && !valid_phone(phone)
        {
            return Err(IdentityError::InvalidPhone);
        }

        self.signups
            .put(
                &email,
                SignupProfile {
                    first_name: first_name.trim().to_string(),
                    last_name: last_name.trim().to_string(),
                    phone_number,
                },
            )
            .await;
        debug!("signup session stored");

        Ok(SignupAck {
            message: SIGNUP_STARTED_MESSAGE.to_string(),
            email,
        })
    }

    /// Signup step 2: set the password and create the account.
    ///
    /// # Errors
    /// `EmailTaken`, `PasswordMismatch`, `WeakPassword` or `SignupNotStarted`.
    #[instrument(skip(self, password, confirm_password))]
    pub async fn complete_signup(
        &self,
        email: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<User, IdentityError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(IdentityError::InvalidEmail);
        }
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(IdentityError::EmailTaken);
        }
        if password != confirm_password {
            return Err(IdentityError::PasswordMismatch);
        }
        check_password_strength(password)?;

        let profile = match self.signups.take(&email).await {
            Some(profile) => profile,
            None => match self.config.missing_signup_policy {
                MissingSignupPolicy::Reject => return Err(IdentityError::SignupNotStarted),
                MissingSignupPolicy::DefaultProfile => {
                    debug!("no signup session, using default profile");
                    SignupProfile {
                        first_name: "Default".to_string(),
                        last_name: "User".to_string(),
                        phone_number: None,
                    }
                }
            },
        };

        let password_hash = self.hash_password(password).await?;

        let mut user = User::new(
            email.clone(),
            profile.first_name,
            profile.last_name,
            self.clock.now(),
        );
        user.username = Some(email);
        user.phone_number = profile.phone_number;
        user.password_hash = Some(password_hash);
        user.verification_token = Some(generate_verification_token()?);

        match self.users.insert(&user).await {
            Ok(()) => {}
            Err(StoreError::Conflict(UniqueField::Email | UniqueField::Username)) => {
                return Err(IdentityError::EmailTaken);
            }
            Err(err) => return Err(err.into()),
        }

        info!(user_id = %user.id, "account created");
        Ok(user)
    }

    /// Password login by username, falling back to email.
    ///
    /// # Errors
    /// `InvalidCredentials` for any lookup or password failure, `AccountDisabled`
    /// for disabled accounts.
    #[instrument(skip(self, password))]
    pub async fn login(&self, identifier: &str, password: &str) -> Result<TokenPair, IdentityError> {
        let identifier = identifier.trim();
        let user = match self.users.find_by_username(identifier).await? {
            Some(user) => Some(user),
            None => self.users.find_by_email(&normalize_email(identifier)).await?,
        };

        let Some(user) = user else {
            debug!("login for unknown identifier");
            return Err(IdentityError::InvalidCredentials);
        };
        let Some(digest) = user.password_hash.clone() else {
            debug!(user_id = %user.id, "login for account without password");
            return Err(IdentityError::InvalidCredentials);
        };
        if !self.verify_password(password, digest).await? {
            debug!(user_id = %user.id, "password mismatch");
            return Err(IdentityError::InvalidCredentials);
        }
        if user.disabled {
            return Err(IdentityError::AccountDisabled);
        }

        self.users.record_login(user.id, self.clock.now()).await?;

        let access = self.issue_access(&user.id.to_string(), &user.roles)?;
        let refresh = self.issue(
            &user.id.to_string(),
            &user.roles,
            Some(TokenPurpose::Refresh),
            self.config.refresh_token_ttl,
        )?;

        info!(user_id = %user.id, "login succeeded");
        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            token_type: TOKEN_TYPE.to_string(),
            expires_at: access.claims.expires_at(),
        })
    }

    /// Mint a new access token from a live refresh token. The refresh token is
    /// handed back unchanged.
    ///
    /// # Errors
    /// `InvalidToken`, `NotARefreshToken` or `TokenRevoked`.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, IdentityError> {
        let claims = self.live_claims(refresh_token)?;
        if claims.purpose != Some(TokenPurpose::Refresh) {
            return Err(IdentityError::NotARefreshToken);
        }
        if self.revocations.is_revoked(&claims.jti).await {
            return Err(IdentityError::TokenRevoked);
        }

        let access = self.issue_access(&claims.sub, &claims.roles)?;
        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh_token.trim().to_string(),
            token_type: TOKEN_TYPE.to_string(),
            expires_at: access.claims.expires_at(),
        })
    }

    /// Revoke a token until its natural expiry.
    ///
    /// # Errors
    /// `InvalidToken` when it does not decode, `MalformedToken` without a jti.
    #[instrument(skip_all)]
    pub async fn logout(&self, token: &str) -> Result<(), IdentityError> {
        let claims = self
            .codec
            .decode(token)
            .map_err(|_| IdentityError::InvalidToken)?;
        if claims.jti.trim().is_empty() {
            return Err(IdentityError::MalformedToken);
        }

        self.revocations
            .revoke(&claims.jti, claims.expires_at())
            .await;
        info!(subject = %claims.sub, "token revoked");
        Ok(())
    }

    /// Map a bearer access token to its user.
    ///
    /// # Errors
    /// `InvalidToken` for bad, expired, revoked or non-access tokens;
    /// `UserNotFound` when the subject no longer exists.
    #[instrument(skip_all)]
    pub async fn resolve(&self, access_token: &str) -> Result<User, IdentityError> {
        let claims = self.live_claims(access_token)?;
        if claims.purpose.is_some() {
            return Err(IdentityError::InvalidToken);
        }
        if self.revocations.is_revoked(&claims.jti).await {
            return Err(IdentityError::InvalidToken);
        }
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| IdentityError::InvalidToken)?;

        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(IdentityError::UserNotFound)
    }

    /// Sign in (or sign up) with a Google ID token.
    ///
    /// # Errors
    /// `InvalidFederatedToken`, `VerificationTimeout` or `FederatedUnavailable`.
    #[instrument(skip_all)]
    pub async fn google_auth(&self, assertion: &str) -> Result<FederatedLogin, IdentityError> {
        let identity = self.federated.verify(assertion).await.map_err(|err| {
            match err {
                VerificationError::Rejected(reason) => {
                    debug!("federated assertion rejected: {reason}");
                    IdentityError::InvalidFederatedToken
                }
                VerificationError::Timeout => IdentityError::VerificationTimeout,
                VerificationError::Unavailable(reason) => {
                    warn!("federated verifier unavailable: {reason}");
                    IdentityError::FederatedUnavailable
                }
            }
        })?;

        if !identity.email_verified || identity.federated_id.trim().is_empty() {
            return Err(IdentityError::InvalidFederatedToken);
        }
        let email = identity
            .email
            .as_deref()
            .map(normalize_email)
            .filter(|email| valid_email(email))
            .ok_or(IdentityError::InvalidFederatedToken)?;

        // A losing concurrent insert sees the winner on the next lookup.
        for attempt in 1..=FEDERATED_LINK_ATTEMPTS {
            if let Some(user) = self.find_federated_account(&identity, &email).await? {
                return self.link_and_sign_in(user, &identity).await;
            }

            let user = self.new_federated_user(&identity, &email);
            match self.users.insert(&user).await {
                Ok(()) => {
                    info!(user_id = %user.id, "federated account created");
                    return self.sign_in_federated(user);
                }
                Err(StoreError::Conflict(UniqueField::Username)) => {
                    debug!(attempt, "derived username taken");
                    break;
                }
                Err(StoreError::Conflict(field)) => {
                    debug!(attempt, %field, "federated insert lost a race, retrying lookup");
                }
                Err(err) => return Err(err.into()),
            }
        }

        // Derived username belongs to an unrelated account.
        let user = self.new_federated_user_with_fallback_username(&identity, &email);
        match self.users.insert(&user).await {
            Ok(()) => self.sign_in_federated(user),
            Err(StoreError::Conflict(_)) => match self.find_federated_account(&identity, &email).await? {
                Some(user) => self.link_and_sign_in(user, &identity).await,
                None => Err(IdentityError::FederatedIdTaken),
            },
            Err(err) => Err(err.into()),
        }
    }

    /// Mark the email of the token's owner as verified. Tokens are single-use.
    ///
    /// # Errors
    /// `InvalidVerificationToken` when no account holds the token.
    #[instrument(skip_all)]
    pub async fn verify_email(&self, token: &str) -> Result<User, IdentityError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(IdentityError::InvalidVerificationToken);
        }
        let user = self
            .users
            .consume_verification_token(token)
            .await?
            .ok_or(IdentityError::InvalidVerificationToken)?;

        info!(user_id = %user.id, "email verified");
        Ok(user)
    }

    /// Issue a password reset token when the email belongs to an account.
    ///
    /// # Errors
    /// Only store or signing failures.
    #[instrument(skip_all)]
    pub async fn request_password_reset(
        &self,
        email: &str,
    ) -> Result<PasswordResetAck, IdentityError> {
        let email = normalize_email(email);
        let reset_token = match self.users.find_by_email(&email).await? {
            Some(user) => {
                let issued = self.issue(
                    &user.id.to_string(),
                    &[],
                    Some(TokenPurpose::PasswordReset),
                    self.config.password_reset_ttl,
                )?;
                info!(user_id = %user.id, "password reset token issued");
                Some(issued.token)
            }
            None => {
                debug!("password reset requested for unknown email");
                None
            }
        };

        Ok(PasswordResetAck {
            message: PASSWORD_RESET_MESSAGE.to_string(),
            reset_token,
        })
    }

    /// Replace the password using a reset token. The token is burned before the
    /// new password is written, so only one confirmation can succeed.
    ///
    /// # Errors
    /// `PasswordMismatch`, `InvalidToken`, `WrongPurpose`, `UserNotFound` or
    /// `WeakPassword`.
    #[instrument(skip_all)]
    pub async fn confirm_password_reset(
        &self,
        token: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), IdentityError> {
        if new_password != confirm_password {
            return Err(IdentityError::PasswordMismatch);
        }
        let claims = self.live_claims(token)?;
        if claims.purpose != Some(TokenPurpose::PasswordReset) {
            return Err(IdentityError::WrongPurpose);
        }
        if claims.jti.trim().is_empty() || self.revocations.is_revoked(&claims.jti).await {
            return Err(IdentityError::InvalidToken);
        }
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| IdentityError::InvalidToken)?;
        if self.users.find_by_id(user_id).await?.is_none() {
            return Err(IdentityError::UserNotFound);
        }
        check_password_strength(new_password)?;

        if !self
            .revocations
            .revoke_once(&claims.jti, claims.expires_at())
            .await
        {
            debug!(%user_id, "reset token already used");
            return Err(IdentityError::InvalidToken);
        }
        let password_hash = self.hash_password(new_password).await?;
        self.users.set_password_hash(user_id, &password_hash).await?;

        info!(%user_id, "password reset");
        Ok(())
    }

    /// Apply self-service profile changes.
    ///
    /// # Errors
    /// `UserNotFound`, `InvalidEmail`, `InvalidPhone` or `EmailTaken`.
    #[instrument(skip(self, update))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        update: ProfileUpdate,
    ) -> Result<User, IdentityError> {
        let mut user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(IdentityError::UserNotFound)?;

        if let Some(email) = update.email.as_deref() {
            let email = normalize_email(email);
            if !valid_email(&email) {
                return Err(IdentityError::InvalidEmail);
            }
            // Password accounts sign in with their email as username.
            if user.username.as_deref() == Some(user.email.as_str()) {
                user.username = Some(email.clone());
            }
            user.email = email;
        }
        if let Some(phone) = update.phone_number.as_deref() {
            user.phone_number = clean_optional(Some(phone));
            if let Some(phone) = user.phone_number.as_deref()
                && !valid_phone(phone)
            {
                return Err(IdentityError::InvalidPhone);
            }
        }

        let mut names_changed = false;
        if let Some(first_name) = update.first_name {
            names_changed |= first_name != user.first_name;
            user.first_name = first_name;
        }
        if let Some(last_name) = update.last_name {
            names_changed |= last_name != user.last_name;
            user.last_name = last_name;
        }
        if let Some(full_name) = update.full_name {
            user.full_name = full_name;
        } else if names_changed {
            user.full_name = compose_full_name(&user.first_name, &user.last_name);
        }

        let user = match self
            .users
            .update_profile(user.id, &ProfileRecord::from(&user))
            .await
        {
            Ok(user) => user,
            Err(StoreError::Conflict(UniqueField::Email | UniqueField::Username)) => {
                return Err(IdentityError::EmailTaken);
            }
            Err(err) => return Err(err.into()),
        };

        debug!(user_id = %user.id, "profile updated");
        Ok(user)
    }

    /// Purge expired revocation entries and stale signup sessions.
    pub async fn sweep(&self) -> (usize, usize) {
        let revocations = self.revocations.purge_expired().await;
        let signups = self.signups.purge_expired().await;
        (revocations, signups)
    }

    fn issue(
        &self,
        subject: &str,
        roles: &[String],
        purpose: Option<TokenPurpose>,
        ttl: TimeDelta,
    ) -> Result<IssuedToken, IdentityError> {
        let grant = Grant {
            subject: subject.to_string(),
            roles: roles.to_vec(),
            purpose,
        };
        self.codec
            .issue(&grant, ttl)
            .context("failed to sign token")
            .map_err(IdentityError::from)
    }

    fn issue_access(&self, subject: &str, roles: &[String]) -> Result<IssuedToken, IdentityError> {
        self.issue(subject, roles, None, self.config.access_token_ttl)
    }

    /// Decoded claims of a token that has not yet expired.
    fn live_claims(&self, token: &str) -> Result<TokenClaims, IdentityError> {
        let claims = self
            .codec
            .decode(token)
            .map_err(|_| IdentityError::InvalidToken)?;
        if claims.is_expired(self.clock.now()) {
            return Err(IdentityError::InvalidToken);
        }
        Ok(claims)
    }

    async fn hash_password(&self, password: &str) -> Result<String, IdentityError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let digest = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .context("password hashing task failed")??;
        Ok(digest)
    }

    async fn verify_password(&self, password: &str, digest: String) -> Result<bool, IdentityError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let matches = tokio::task::spawn_blocking(move || hasher.verify(&password, &digest))
            .await
            .context("password verification task failed")?;
        Ok(matches)
    }

    async fn find_federated_account(
        &self,
        identity: &FederatedIdentity,
        email: &str,
    ) -> Result<Option<User>, IdentityError> {
        if let Some(user) = self
            .users
            .find_by_federated_id(&identity.federated_id)
            .await?
        {
            return Ok(Some(user));
        }
        match self.users.find_by_email(email).await? {
            Some(user) => match user.federated_id.as_deref() {
                Some(linked) if linked != identity.federated_id => {
                    warn!(user_id = %user.id, "email already linked to another federated identity");
                    Err(IdentityError::InvalidFederatedToken)
                }
                _ => Ok(Some(user)),
            },
            None => Ok(None),
        }
    }

    async fn link_and_sign_in(
        &self,
        user: User,
        identity: &FederatedIdentity,
    ) -> Result<FederatedLogin, IdentityError> {
        if user.disabled {
            return Err(IdentityError::AccountDisabled);
        }
        if user.federated_id.is_none() {
            info!(user_id = %user.id, "linking federated identity");
        }
        let sign_in = FederatedSignIn {
            federated_id: identity.federated_id.clone(),
            first_name: identity
                .given_name
                .clone()
                .filter(|name| *name != user.first_name),
            last_name: identity
                .family_name
                .clone()
                .filter(|name| *name != user.last_name),
            at: self.clock.now(),
        };

        match self.users.record_federated_login(user.id, &sign_in).await? {
            Some(user) => self.sign_in_federated(user),
            None => {
                warn!(user_id = %user.id, "account linked to another federated identity meanwhile");
                Err(IdentityError::InvalidFederatedToken)
            }
        }
    }

    fn new_federated_user(&self, identity: &FederatedIdentity, email: &str) -> User {
        let mut user = User::new(
            email.to_string(),
            identity.given_name.clone().unwrap_or_default(),
            identity.family_name.clone().unwrap_or_default(),
            self.clock.now(),
        );
        user.username = Some(federated_username(email, &identity.federated_id));
        user.email_verified = true;
        user.federated_id = Some(identity.federated_id.clone());
        user.last_login = Some(user.created_at);
        user
    }

    fn new_federated_user_with_fallback_username(
        &self,
        identity: &FederatedIdentity,
        email: &str,
    ) -> User {
        let mut user = self.new_federated_user(identity, email);
        user.username = Some(format!("google_{}", identity.federated_id));
        user
    }

    fn sign_in_federated(&self, user: User) -> Result<FederatedLogin, IdentityError> {
        let access = self.issue_access(&user.id.to_string(), &user.roles)?;
        Ok(FederatedLogin {
            expires_at: access.claims.expires_at(),
            access_token: access.token,
            user,
        })
    }
}

fn clean_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_signup_policy_parses() {
        assert_eq!(
            "reject".parse::<MissingSignupPolicy>(),
            Ok(MissingSignupPolicy::Reject)
        );
        assert_eq!(
            "Default-Profile".parse::<MissingSignupPolicy>(),
            Ok(MissingSignupPolicy::DefaultProfile)
        );
        assert!("maybe".parse::<MissingSignupPolicy>().is_err());
        assert_eq!(MissingSignupPolicy::DefaultProfile.to_string(), "default-profile");
    }

    #[test]
    fn config_builder_overrides_defaults() {
        let config = IdentityConfig::new()
            .with_access_token_ttl_minutes(5)
            .with_refresh_token_ttl_days(1)
            .with_password_reset_ttl_seconds(120)
            .with_missing_signup_policy(MissingSignupPolicy::DefaultProfile);

        assert_eq!(config.access_token_ttl(), TimeDelta::minutes(5));
        assert_eq!(config.refresh_token_ttl(), TimeDelta::days(1));
        assert_eq!(config.password_reset_ttl(), TimeDelta::seconds(120));
        assert_eq!(
            config.missing_signup_policy(),
            MissingSignupPolicy::DefaultProfile
        );

        let defaults = IdentityConfig::default();
        assert_eq!(defaults.access_token_ttl(), TimeDelta::minutes(30));
        assert_eq!(defaults.refresh_token_ttl(), TimeDelta::days(7));
        assert_eq!(defaults.password_reset_ttl(), TimeDelta::hours(1));
    }

    #[test]
    fn clean_optional_drops_blank_values() {
        assert_eq!(clean_optional(Some("  ")), None);
        assert_eq!(clean_optional(Some(" +254712345678 ")), Some("+254712345678".to_string()));
        assert_eq!(clean_optional(None), None);
    }
}
