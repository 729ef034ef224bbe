//! User account model and password hashing.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: Option<String>,
    /// Argon2 PHC string. Never serialized.
    #[serde(skip_serializing, default)]
    pub password: String,
    pub discord_id: u64,
    pub total_credits: i64,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Check `password` against the stored hash in constant time.
    pub fn compare(&self, password: &str) -> Result<(), PasswordError> {
        verify_password(password, &self.password)
    }
}

/// Page of users plus the total number stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserList {
    pub total_count: u64,
    pub items: Vec<User>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ListOptions {
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl ListOptions {
    pub const DEFAULT_LIMIT: u64 = 1000;

    pub fn offset(&self) -> usize {
        self.offset.unwrap_or(0) as usize
    }

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT) as usize
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("password hash is malformed")]
    MalformedHash,
    #[error("password mismatch")]
    Mismatch,
    #[error("hashing failed: {0}")]
    Hash(String),
}

/// Hash `password` with Argon2id default parameters and a random salt.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    hash_password_with(&Argon2::default(), password)
}

pub(crate) fn hash_password_with(argon2: &Argon2<'_>, password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<(), PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|_| PasswordError::MalformedHash)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| PasswordError::Mismatch)
}

/// Cheap hashing parameters for tests.
#[cfg(test)]
pub(crate) fn test_hash(password: &str) -> String {
    let params = argon2::Params::new(1024, 1, 1, None).unwrap();
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);
    hash_password_with(&argon2, password).unwrap()
}
