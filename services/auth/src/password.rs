//! Password credentials
//!
//! Stored passwords are either Argon2 PHC strings or, for records imported
//! from the previous system, plaintext. The plaintext form is a migration
//! shim: it is verified by direct comparison, flagged in the logs, and
//! replaced by a hash on the next successful login.

use anyhow::Result;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};

/// Argon2id hash with the default cost parameters that no password matches.
/// Verified in place of a real record so unknown and inactive users take as
/// long to reject as a wrong password.
pub const DUMMY_PASSWORD_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// A stored password, resolved into its encoding
#[derive(Debug)]
pub enum Credential<'a> {
    /// Argon2 hash with its per-record salt
    Hashed(PasswordHash<'a>),
    /// Plaintext value from a record that predates hashing
    Legacy(&'a str),
}

impl<'a> Credential<'a> {
    /// Classify a stored value. Anything that does not parse as a PHC
    /// string is treated as a legacy plaintext password.
    pub fn from_stored(stored: &'a str) -> Self {
        match PasswordHash::new(stored) {
            Ok(hash) => Credential::Hashed(hash),
            Err(_) => Credential::Legacy(stored),
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Credential::Legacy(_))
    }

    /// Check a candidate password against the credential
    pub fn verify(&self, password: &str) -> bool {
        match self {
            Credential::Hashed(hash) => Argon2::default()
                .verify_password(password.as_bytes(), hash)
                .is_ok(),
            Credential::Legacy(stored) => !stored.is_empty() && *stored == password,
        }
    }
}

/// Hash a password with a fresh salt
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(password_hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_credentials_verify() {
        let stored = hash_password("S3cure!pass").unwrap();
        let credential = Credential::from_stored(&stored);

        assert!(!credential.is_legacy());
        assert!(credential.verify("S3cure!pass"));
        assert!(!credential.verify("s3cure!pass"));
    }

    #[test]
    fn salts_differ_per_record() {
        assert_ne!(
            hash_password("same-password").unwrap(),
            hash_password("same-password").unwrap()
        );
    }

    #[test]
    fn plaintext_is_legacy() {
        let credential = Credential::from_stored("admin123");

        assert!(credential.is_legacy());
        assert!(credential.verify("admin123"));
        assert!(!credential.verify("admin1234"));
    }

    #[test]
    fn dummy_hash_is_a_real_argon2_hash() {
        let credential = Credential::from_stored(DUMMY_PASSWORD_HASH);

        assert!(!credential.is_legacy());
        assert!(!credential.verify("admin123"));
        assert!(!credential.verify(""));
    }

    #[test]
    fn empty_legacy_value_never_matches() {
        assert!(!Credential::from_stored("").verify(""));
    }
}
