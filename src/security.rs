//! Credential handling: Argon2id password hashing and the register/verify
//! operations backed by the user store. Passwords are never stored or logged
//! in plaintext; verification re-derives the hash with the stored salt and
//! compares in constant time.

use anyhow::Result;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};

use crate::error::AppError;
use crate::storage::{SharedStore, User};

pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes)
        .map_err(|e| AppError::internal("salt_generation_failed", e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::internal("salt_encoding_failed", e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::internal("password_hash_failed", e.to_string()))?
        .to_string();
    Ok(phc)
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else {
        false
    }
}

/// Create a local account. Fails with `DuplicateUser` when the username is
/// taken; the store lock is held across the check and the insert, so exactly
/// one record per username can exist.
pub fn register(store: &SharedStore, username: &str, password: &str) -> Result<User> {
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(AppError::user("empty_credentials", "username and password are required").into());
    }
    let hash = hash_password(password)?;
    let guard = store.0.lock();
    guard.insert_local_user(username, &hash)
}

/// Check a username+password pair against the store. Unknown username and
/// wrong password are indistinguishable to the caller; no state is mutated on
/// failure.
pub fn verify(store: &SharedStore, username: &str, password: &str) -> Result<User> {
    let found = { store.0.lock().find_by_username(username.trim())? };
    let Some(user) = found else {
        return Err(AppError::invalid_credentials().into());
    };
    let Some(hash) = user.password_hash.as_deref() else {
        // Federated account with no local credential
        return Err(AppError::invalid_credentials().into());
    };
    if !verify_password(hash, password) {
        return Err(AppError::invalid_credentials().into());
    }
    Ok(user)
}
