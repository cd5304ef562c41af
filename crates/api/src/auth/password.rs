//! Password hashing with Argon2

use std::{fmt, sync::OnceLock};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash as PhcHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// A salted one-way password hash in PHC string format.
///
/// Only obtainable through [`hash_password`] or by loading an already-hashed
/// value from storage, so plaintext cannot reach the store by mistake.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Wrap a hash read back from storage
    pub fn from_stored(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(<redacted>)")
    }
}

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> Result<PasswordHash, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| PasswordHash(hash.to_string()))
        .map_err(|e| PasswordError::Hashing(e.to_string()))
}

/// Verify a password against a hash
///
/// Argon2 compares digests in constant time.
pub fn verify_password(password: &str, hash: &PasswordHash) -> Result<bool, PasswordError> {
    let parsed_hash =
        PhcHash::new(hash.as_str()).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Burn the same amount of work as a real verification.
///
/// Used when the login identity does not exist so response timing does not
/// reveal which usernames and emails are registered.
pub fn verify_against_dummy(password: &str) {
    static DUMMY: OnceLock<Option<PasswordHash>> = OnceLock::new();

    let dummy = DUMMY.get_or_init(|| hash_password("tubeline-dummy-password").ok());
    if let Some(hash) = dummy {
        let _ = verify_password(password, hash);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    Hashing(String),
    #[error("Invalid password hash: {0}")]
    InvalidHash(String),
}
