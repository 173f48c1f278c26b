//! # entrecore-auth
//!
//! Authentication and session lifecycle service: password and Google sign-in,
//! two-step signup, bearer token issuance, refresh and revocation, email
//! verification, password reset and self-service profile updates.
//!
//! ## Sessions
//!
//! Sessions are stateless JWTs signed with a process-wide HMAC secret. Every
//! token carries a unique `jti`; logout and single-use reset tokens record
//! that `jti` in a revocation registry until the token would have expired on
//! its own.
//!
//! ## Signup
//!
//! Signup is split in two calls. The first stores the profile keyed by the
//! normalized email for a limited time; the second sets the password and
//! creates the account in one atomic write.

pub mod api;
pub mod cli;
pub mod db;
pub mod identity;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
