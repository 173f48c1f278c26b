//! Password hashing with Argon2id.
//!
//! Digests are PHC strings, so the salt and parameters travel with the hash and
//! verification keeps working after the parameters are tuned.

use anyhow::{Result, anyhow};
use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::{SaltString, rand_core::OsRng},
};

#[derive(Clone, Debug)]
pub struct CredentialHasher {
    params: Params,
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl CredentialHasher {
    /// Build a hasher with explicit Argon2id cost parameters.
    ///
    /// # Errors
    /// Returns an error if the parameters are outside the ranges Argon2 accepts.
    pub fn with_params(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|err| anyhow!("invalid Argon2 parameters: {err}"))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password with a fresh random salt.
    ///
    /// # Errors
    /// Returns an error if Argon2 fails to produce a digest.
    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| anyhow!("failed to hash password: {err}"))
    }

    /// Check a password against a stored digest. Malformed digests never match.
    #[must_use]
    pub fn verify(&self, password: &str, digest: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            return false;
        };
        self.argon2()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> Result<CredentialHasher> {
        CredentialHasher::with_params(256, 1, 1)
    }

    #[test]
    fn hash_then_verify() -> Result<()> {
        let hasher = hasher()?;
        let digest = hasher.hash("GoodPass123!")?;
        assert!(digest.starts_with("$argon2id$"));
        assert!(hasher.verify("GoodPass123!", &digest));
        assert!(!hasher.verify("GoodPass123?", &digest));
        Ok(())
    }

    #[test]
    fn salts_differ_between_calls() -> Result<()> {
        let hasher = hasher()?;
        let first = hasher.hash("same-input")?;
        let second = hasher.hash("same-input")?;
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn malformed_digest_is_rejected_without_error() -> Result<()> {
        let hasher = hasher()?;
        assert!(!hasher.verify("anything", "not-a-phc-string"));
        assert!(!hasher.verify("anything", ""));
        Ok(())
    }

    #[test]
    fn verifies_digest_produced_with_other_params() -> Result<()> {
        let digest = hasher()?.hash("GoodPass123!")?;
        let stronger = CredentialHasher::with_params(512, 2, 1)?;
        assert!(stronger.verify("GoodPass123!", &digest));
        Ok(())
    }

    #[test]
    fn rejects_invalid_params() {
        assert!(CredentialHasher::with_params(1, 0, 0).is_err());
    }
}
