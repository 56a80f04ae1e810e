// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Password hashing.
//!
//! Passwords are stored as Argon2id PHC strings
//! (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`). An account without a
//! password stores [`UNUSABLE_PASSWORD`], which never verifies.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use ring::rand::{SecureRandom, SystemRandom};

/// Stored in place of a hash when the account cannot log in with a password.
pub const UNUSABLE_PASSWORD: &str = "!";

const SALT_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("password must not be empty")]
    Empty,

    #[error("failed to generate salt")]
    Rng,

    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// Hash a raw password into a PHC string with a fresh random salt.
pub fn hash_password(raw: &str) -> Result<String, PasswordError> {
    if raw.is_empty() {
        return Err(PasswordError::Empty);
    }

    let mut salt = [0u8; SALT_LEN];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| PasswordError::Rng)?;
    let salt = SaltString::encode_b64(&salt).map_err(|e| PasswordError::Hash(e.to_string()))?;

    let hash = Argon2::default()
        .hash_password(raw.as_bytes(), &salt)
        .map_err(|e| PasswordError::Hash(e.to_string()))?;
    Ok(hash.to_string())
}

/// Check a raw password against a stored value.
///
/// Unusable markers and malformed hashes never match.
pub fn verify_password(raw: &str, stored: &str) -> bool {
    if !is_usable(stored) {
        return false;
    }
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(raw.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash cannot be parsed");
            false
        }
    }
}

/// Whether a stored value is a real hash rather than an unusable marker.
pub fn is_usable(stored: &str) -> bool {
    !stored.is_empty() && !stored.starts_with(UNUSABLE_PASSWORD)
}
