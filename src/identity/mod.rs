//! Authentication and session lifecycle.
//!
//! [`IdentityService`] is the only entry point the transport layer needs. It is
//! built from a [`TokenCodec`], a [`CredentialHasher`] and shared backends
//! ([`IdentityBackends`]) so tests and single-node deployments can use the
//! in-memory implementations while production uses PostgreSQL for users.

pub mod clock;
pub mod error;
pub mod federated;
pub mod hasher;
pub(crate) mod policy;
pub mod revocation;
pub mod service;
pub mod signup;
pub mod store;
pub mod token;
pub mod user;


pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ErrorKind, IdentityError};
pub use federated::{
    FederatedIdentity, FederatedIdentityVerifier, GoogleVerifier, GoogleVerifierConfig,
    VerificationError,
};
pub use hasher::CredentialHasher;
pub use revocation::{InMemoryRevocationRegistry, RevocationRegistry};
pub use service::{
    FederatedLogin, IdentityBackends, IdentityConfig, IdentityService, MissingSignupPolicy,
    PasswordResetAck, SignupAck, TokenPair,
};
pub use signup::{InMemorySignupStore, SignupProfile, SignupSessionStore};
pub use store::{
    FederatedSignIn, InMemoryUserStore, PgUserStore, ProfileRecord, StoreError, UniqueField,
    UserStore,
};
pub use token::{Grant, IssuedToken, SigningAlgorithm, TokenClaims, TokenCodec, TokenPurpose};
pub use user::{DEFAULT_ROLE, ProfileUpdate, User};
