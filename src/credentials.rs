use sha2::{Digest, Sha256};
use std::fmt;

/// Hex-encoded SHA-256 digest of the pre-shared password
///
/// This is the only form of the secret the client keeps; the plaintext is
/// dropped as soon as it has been hashed.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretHash(String);

impl SecretHash {
    /// Hash a plaintext secret
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self(hash_secret(secret))
    }

    /// The lowercase hex digest sent to the login endpoint
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretHash(<redacted>)")
    }
}

/// Compute the 64-character lowercase hex SHA-256 digest of `secret`
#[must_use]
pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Controller address and hashed password
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Base URL every endpoint path is appended to
    pub base_url: String,
    /// Hashed password
    pub secret: SecretHash,
}

impl Credentials {
    /// Build credentials, hashing the plaintext secret immediately
    #[must_use]
    pub fn new(base_url: impl Into<String>, secret: &str) -> Self {
        Self {
            base_url: base_url.into(),
            secret: SecretHash::new(secret),
        }
    }
}
