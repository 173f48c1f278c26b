//! Third-party identity assertions (Google ID tokens).
//!
//! The verifier turns an opaque assertion into a [`FederatedIdentity`] or a
//! [`VerificationError`]; linking that identity to an account is the service's
//! job.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::APP_USER_AGENT;

pub const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
pub const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

const DEFAULT_TIMEOUT_SECONDS: u64 = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FederatedIdentity {
    pub email: Option<String>,
    pub email_verified: bool,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub federated_id: String,
    pub issuer: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("assertion rejected: {0}")]
    Rejected(String),
    #[error("identity provider timed out")]
    Timeout,
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait FederatedIdentityVerifier: Send + Sync {
    async fn verify(&self, assertion: &str) -> Result<FederatedIdentity, VerificationError>;
}

/// Claims returned by Google's tokeninfo endpoint. Booleans arrive as strings.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenInfo {
    #[serde(default)]
    iss: String,
    #[serde(default)]
    aud: String,
    #[serde(default)]
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<serde_json::Value>,
    given_name: Option<String>,
    family_name: Option<String>,
}

fn truthy(value: Option<&serde_json::Value>) -> bool {
    match value {
        Some(serde_json::Value::Bool(flag)) => *flag,
        Some(serde_json::Value::String(text)) => text.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Check issuer, audience and email verification on already-fetched claims.
pub(crate) fn verify_claims(
    info: TokenInfo,
    client_ids: &[String],
) -> Result<FederatedIdentity, VerificationError> {
    if !GOOGLE_ISSUERS.contains(&info.iss.as_str()) {
        return Err(VerificationError::Rejected(format!(
            "untrusted issuer: {}",
            info.iss
        )));
    }
    if !client_ids.is_empty() && !client_ids.iter().any(|id| *id == info.aud) {
        return Err(VerificationError::Rejected("audience mismatch".to_string()));
    }
    if info.sub.trim().is_empty() {
        return Err(VerificationError::Rejected("missing subject".to_string()));
    }
    if !truthy(info.email_verified.as_ref()) {
        return Err(VerificationError::Rejected("email not verified".to_string()));
    }

    Ok(FederatedIdentity {
        email: info.email.filter(|email| !email.trim().is_empty()),
        email_verified: true,
        given_name: info.given_name.filter(|name| !name.trim().is_empty()),
        family_name: info.family_name.filter(|name| !name.trim().is_empty()),
        federated_id: info.sub,
        issuer: info.iss,
    })
}

#[derive(Clone, Debug)]
pub struct GoogleVerifierConfig {
    tokeninfo_url: Url,
    client_ids: Vec<String>,
    timeout: Duration,
}

impl GoogleVerifierConfig {
    /// # Errors
    /// Returns an error if `tokeninfo_url` is not a valid URL.
    pub fn new(tokeninfo_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            tokeninfo_url: Url::parse(tokeninfo_url)?,
            client_ids: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
        })
    }

    #[must_use]
    pub fn with_client_ids(mut self, client_ids: Vec<String>) -> Self {
        self.client_ids = client_ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Verifies Google ID tokens against the tokeninfo endpoint.
#[derive(Clone, Debug)]
pub struct GoogleVerifier {
    client: Client,
    config: GoogleVerifierConfig,
}

impl GoogleVerifier {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: GoogleVerifierConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }
}

fn classify(err: &reqwest::Error) -> VerificationError {
    if err.is_timeout() {
        VerificationError::Timeout
    } else {
        VerificationError::Unavailable(err.to_string())
    }
}

#[async_trait]
impl FederatedIdentityVerifier for GoogleVerifier {
    #[instrument(skip_all)]
    async fn verify(&self, assertion: &str) -> Result<FederatedIdentity, VerificationError> {
        if assertion.trim().is_empty() {
            return Err(VerificationError::Rejected("empty assertion".to_string()));
        }

        let response = self
            .client
            .get(self.config.tokeninfo_url.clone())
            .query(&[("id_token", assertion)])
            .send()
            .await
            .map_err(|err| {
                warn!("tokeninfo request failed: {err}");
                classify(&err)
            })?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(VerificationError::Unavailable(format!(
                "tokeninfo returned {status}"
            )));
        }
        if !status.is_success() {
            debug!("tokeninfo rejected assertion with {status}");
            return Err(VerificationError::Rejected(format!(
                "tokeninfo returned {status}"
            )));
        }

        let info: TokenInfo = response.json().await.map_err(|err| {
            if err.is_timeout() {
                VerificationError::Timeout
            } else {
                VerificationError::Rejected(format!("unreadable tokeninfo response: {err}"))
            }
        })?;

        verify_claims(info, &self.config.client_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::Query, http::StatusCode as HttpStatus, routing::get};
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    fn info(value: Value) -> TokenInfo {
        serde_json::from_value(value).unwrap()
    }

    fn google_claims() -> Value {
        json!({
            "iss": "https://accounts.google.com",
            "aud": "client-1",
            "sub": "1234567890",
            "email": "jane@gmail.com",
            "email_verified": "true",
            "given_name": "Jane",
            "family_name": "Doe"
        })
    }

    #[test]
    fn accepts_verified_google_claims() {
        let identity = verify_claims(info(google_claims()), &["client-1".to_string()]).unwrap();
        assert_eq!(identity.federated_id, "1234567890");
        assert_eq!(identity.email.as_deref(), Some("jane@gmail.com"));
        assert_eq!(identity.given_name.as_deref(), Some("Jane"));
        assert!(identity.email_verified);
    }

    #[test]
    fn boolean_email_verified_is_accepted() {
        let mut claims = google_claims();
        claims["email_verified"] = json!(true);
        assert!(verify_claims(info(claims), &[]).is_ok());
    }

    #[test]
    fn rejects_untrusted_issuer() {
        let mut claims = google_claims();
        claims["iss"] = json!("https://evil.example.com");
        assert!(matches!(
            verify_claims(info(claims), &[]),
            Err(VerificationError::Rejected(_))
        ));
    }

    #[test]
    fn rejects_foreign_audience_only_when_configured() {
        let claims = google_claims();
        assert!(matches!(
            verify_claims(info(claims.clone()), &["other-client".to_string()]),
            Err(VerificationError::Rejected(_))
        ));
        assert!(verify_claims(info(claims), &[]).is_ok());
    }

    #[test]
    fn rejects_unverified_email() {
        let mut claims = google_claims();
        claims["email_verified"] = json!("false");
        assert!(verify_claims(info(claims), &[]).is_err());

        let mut claims = google_claims();
        if let Some(object) = claims.as_object_mut() {
            object.remove("email_verified");
        }
        assert!(verify_claims(info(claims), &[]).is_err());
    }

    async fn spawn_tokeninfo(delay: Duration) -> String {
        let app = Router::new().route(
            "/tokeninfo",
            get(move |Query(params): Query<HashMap<String, String>>| async move {
                tokio::time::sleep(delay).await;
                match params.get("id_token").map(String::as_str) {
                    Some("good") => (HttpStatus::OK, Json(google_claims())),
                    _ => (
                        HttpStatus::BAD_REQUEST,
                        Json(json!({"error": "invalid_token"})),
                    ),
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}/tokeninfo")
    }

    #[tokio::test]
    async fn verifies_against_tokeninfo_endpoint() {
        let url = spawn_tokeninfo(Duration::ZERO).await;
        let verifier = GoogleVerifier::new(
            GoogleVerifierConfig::new(&url)
                .unwrap()
                .with_client_ids(vec!["client-1".to_string()]),
        )
        .unwrap();

        let identity = verifier.verify("good").await.unwrap();
        assert_eq!(identity.issuer, "https://accounts.google.com");

        assert!(matches!(
            verifier.verify("bad").await,
            Err(VerificationError::Rejected(_))
        ));
        assert!(matches!(
            verifier.verify("  ").await,
            Err(VerificationError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let url = spawn_tokeninfo(Duration::from_secs(2)).await;
        let verifier = GoogleVerifier::new(
            GoogleVerifierConfig::new(&url)
                .unwrap()
                .with_timeout(Duration::from_millis(100)),
        )
        .unwrap();

        assert_eq!(
            verifier.verify("good").await,
            Err(VerificationError::Timeout)
        );
    }

    #[tokio::test]
    async fn unreachable_provider_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let verifier =
            GoogleVerifier::new(GoogleVerifierConfig::new(&format!("http://{addr}/tokeninfo")).unwrap())
                .unwrap();
        assert!(matches!(
            verifier.verify("good").await,
            Err(VerificationError::Unavailable(_))
        ));
    }
}
