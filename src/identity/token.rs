//! Signed session tokens (JWT compact serialization, HMAC).
//!
//! The codec only vouches for integrity. Expiry and revocation are checked by
//! the caller against [`TokenClaims::expires_at`] and the revocation registry.

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind as JwtErrorKind,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc};
use thiserror::Error;
use uuid::Uuid;

use super::clock::Clock;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("malformed token")]
    Malformed,
    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("signing secret must not be empty")]
    EmptySecret,
    #[error("failed to encode token")]
    Encode,
}

/// Distinguishes tokens that share one signing mechanism. Absent means access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Refresh,
    PasswordReset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default)]
    pub jti: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<TokenPurpose>,
}

impl TokenClaims {
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    #[must_use]
    pub fn issued_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.iat, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at() <= now
    }
}

/// What a token asserts, before the codec stamps times and a jti on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub subject: String,
    pub roles: Vec<String>,
    pub purpose: Option<TokenPurpose>,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: TokenClaims,
}

impl IssuedToken {
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.claims.expires_at()
    }
}

/// HMAC algorithms accepted for session tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigningAlgorithm(Algorithm);

impl SigningAlgorithm {
    pub const HS256: Self = Self(Algorithm::HS256);
    pub const HS384: Self = Self(Algorithm::HS384);
    pub const HS512: Self = Self(Algorithm::HS512);
}

impl Default for SigningAlgorithm {
    fn default() -> Self {
        Self::HS256
    }
}

impl FromStr for SigningAlgorithm {
    type Err = TokenError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "HS256" => Ok(Self::HS256),
            "HS384" => Ok(Self::HS384),
            "HS512" => Ok(Self::HS512),
            other => Err(TokenError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

pub struct TokenCodec {
    algorithm: SigningAlgorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &self.algorithm)
            .field("secret", &"***")
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// # Errors
    /// Returns [`TokenError::EmptySecret`] when the secret is blank.
    pub fn new(
        secret: &SecretString,
        algorithm: SigningAlgorithm,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TokenError> {
        let secret = secret.expose_secret().as_bytes();
        if secret.is_empty() {
            return Err(TokenError::EmptySecret);
        }

        // Pin the algorithm; expiry is the caller's concern.
        let mut validation = Validation::new(algorithm.0);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            clock,
        })
    }

    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// Sign a grant valid for `ttl` from now, with a fresh jti.
    ///
    /// # Errors
    /// Returns [`TokenError::Encode`] if the claims cannot be serialized or signed.
    pub fn issue(&self, grant: &Grant, ttl: TimeDelta) -> Result<IssuedToken, TokenError> {
        let now = self.clock.now();
        let claims = TokenClaims {
            sub: grant.subject.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
            roles: grant.roles.clone(),
            purpose: grant.purpose,
        };

        let token = encode(&Header::new(self.algorithm.0), &claims, &self.encoding_key)
            .map_err(|_| TokenError::Encode)?;

        Ok(IssuedToken { token, claims })
    }

    /// Verify the signature and algorithm, then return the claims.
    ///
    /// # Errors
    /// [`TokenError::InvalidSignature`] for bad signatures or a substituted
    /// algorithm, [`TokenError::Malformed`] for anything structurally wrong.
    pub fn decode(&self, token: &str) -> Result<TokenClaims, TokenError> {
        decode::<TokenClaims>(token.trim(), &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                JwtErrorKind::InvalidSignature | JwtErrorKind::InvalidAlgorithm => {
                    TokenError::InvalidSignature
                }
                _ => TokenError::Malformed,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::clock::ManualClock;
    use anyhow::{Context, Result};
    use base64ct::{Base64UrlUnpadded, Encoding};
    use chrono::TimeZone;

    fn clock() -> Result<Arc<ManualClock>> {
        let start = Utc
            .with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
            .single()
            .context("valid start time")?;
        Ok(Arc::new(ManualClock::new(start)))
    }

    fn codec(clock: Arc<ManualClock>) -> Result<TokenCodec> {
        Ok(TokenCodec::new(
            &SecretString::from("test-secret-value"),
            SigningAlgorithm::HS256,
            clock,
        )?)
    }

    fn grant(purpose: Option<TokenPurpose>) -> Grant {
        Grant {
            subject: "2b0c5b4e-9a55-4df6-9a0a-0f8f3f4f1d8e".to_string(),
            roles: vec!["user".to_string(), "admin".to_string()],
            purpose,
        }
    }

    #[test]
    fn issue_then_decode_recovers_subject_and_roles() -> Result<()> {
        let clock = clock()?;
        let codec = codec(clock.clone())?;
        let issued = codec.issue(&grant(None), TimeDelta::minutes(30))?;

        let claims = codec.decode(&issued.token)?;
        assert_eq!(claims.sub, "2b0c5b4e-9a55-4df6-9a0a-0f8f3f4f1d8e");
        assert_eq!(claims.roles, vec!["user", "admin"]);
        assert_eq!(claims.purpose, None);
        assert_eq!(claims.issued_at(), clock.now());
        assert_eq!(claims.expires_at(), clock.now() + TimeDelta::minutes(30));
        assert!(!claims.jti.is_empty());
        Ok(())
    }

    #[test]
    fn every_token_gets_a_fresh_jti() -> Result<()> {
        let codec = codec(clock()?)?;
        let first = codec.issue(&grant(None), TimeDelta::minutes(1))?;
        let second = codec.issue(&grant(None), TimeDelta::minutes(1))?;
        assert_ne!(first.claims.jti, second.claims.jti);
        Ok(())
    }

    #[test]
    fn purpose_survives_round_trip() -> Result<()> {
        let codec = codec(clock()?)?;
        let issued = codec.issue(&grant(Some(TokenPurpose::PasswordReset)), TimeDelta::hours(1))?;
        let claims = codec.decode(&issued.token)?;
        assert_eq!(claims.purpose, Some(TokenPurpose::PasswordReset));
        Ok(())
    }

    #[test]
    fn decode_does_not_check_expiry() -> Result<()> {
        let clock = clock()?;
        let codec = codec(clock.clone())?;
        let issued = codec.issue(&grant(None), TimeDelta::minutes(1))?;
        clock.advance(TimeDelta::hours(2));

        let claims = codec.decode(&issued.token)?;
        assert!(claims.is_expired(clock.now()));
        Ok(())
    }

    #[test]
    fn altered_payload_is_rejected() -> Result<()> {
        let codec = codec(clock()?)?;
        let issued = codec.issue(&grant(None), TimeDelta::minutes(5))?;

        let mut bytes = issued.token.into_bytes();
        let middle = bytes
            .iter()
            .position(|b| *b == b'.')
            .context("token has a payload segment")?
            + 5;
        let byte = bytes.get_mut(middle).context("payload byte")?;
        *byte = if *byte == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes)?;

        assert!(codec.decode(&tampered).is_err());
        Ok(())
    }

    #[test]
    fn other_secret_fails_signature() -> Result<()> {
        let clock = clock()?;
        let issued = codec(clock.clone())?.issue(&grant(None), TimeDelta::minutes(5))?;
        let other = TokenCodec::new(
            &SecretString::from("another-secret"),
            SigningAlgorithm::HS256,
            clock,
        )?;
        assert_eq!(other.decode(&issued.token), Err(TokenError::InvalidSignature));
        Ok(())
    }

    #[test]
    fn algorithm_substitution_is_rejected() -> Result<()> {
        let clock = clock()?;
        let issued = codec(clock.clone())?.issue(&grant(None), TimeDelta::minutes(5))?;
        let hs512 = TokenCodec::new(
            &SecretString::from("test-secret-value"),
            SigningAlgorithm::HS512,
            clock,
        )?;
        assert_eq!(hs512.decode(&issued.token), Err(TokenError::InvalidSignature));
        Ok(())
    }

    #[test]
    fn unsigned_token_is_rejected() -> Result<()> {
        let codec = codec(clock()?)?;
        let header = Base64UrlUnpadded::encode_string(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = Base64UrlUnpadded::encode_string(
            br#"{"sub":"x","iat":0,"exp":9999999999,"jti":"j","roles":["admin"]}"#,
        );
        let forged = format!("{header}.{payload}.");
        assert!(codec.decode(&forged).is_err());
        Ok(())
    }

    #[test]
    fn garbage_is_malformed() -> Result<()> {
        let codec = codec(clock()?)?;
        assert_eq!(codec.decode("not-a-token"), Err(TokenError::Malformed));
        assert_eq!(codec.decode(""), Err(TokenError::Malformed));
        Ok(())
    }

    #[test]
    fn empty_secret_is_refused() -> Result<()> {
        let result = TokenCodec::new(&SecretString::from(""), SigningAlgorithm::HS256, clock()?);
        assert!(matches!(result, Err(TokenError::EmptySecret)));
        Ok(())
    }

    #[test]
    fn algorithm_parses_case_insensitively() {
        assert_eq!("hs384".parse::<SigningAlgorithm>(), Ok(SigningAlgorithm::HS384));
        assert!(matches!(
            "RS256".parse::<SigningAlgorithm>(),
            Err(TokenError::UnsupportedAlgorithm(_))
        ));
        assert_eq!(SigningAlgorithm::HS512.to_string(), "HS512");
    }
}
