//! Password hashing and verification
//!
//! New hashes use the configured scheme. Verification picks the scheme from
//! the stored hash itself, so bcrypt and Argon2 accounts can share a store.
//!
//! Both schemes are CPU-heavy. Connection tasks must go through the
//! `*_blocking` wrappers, which move the work onto Tokio's blocking pool.

use std::sync::OnceLock;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreError;

/// Hashing scheme for newly created accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "scheme")]
pub enum PasswordScheme {
    Bcrypt {
        #[serde(default = "default_bcrypt_cost")]
        cost: u32,
    },
    Argon2,
}

fn default_bcrypt_cost() -> u32 {
    10
}

impl Default for PasswordScheme {
    fn default() -> Self {
        PasswordScheme::Bcrypt {
            cost: default_bcrypt_cost(),
        }
    }
}

/// Hash a password with the given scheme
pub fn hash_password(password: &str, scheme: PasswordScheme) -> Result<String, StoreError> {
    match scheme {
        PasswordScheme::Bcrypt { cost } => bcrypt::hash(password, cost)
            .map_err(|e| StoreError::Hash(format!("bcrypt: {}", e))),
        PasswordScheme::Argon2 => {
            let salt = SaltString::generate(&mut OsRng);
            Argon2::default()
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| StoreError::Hash(format!("argon2: {}", e)))
        }
    }
}

/// Verify a password against a stored hash.
///
/// A malformed stored hash is logged and treated as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    if hash.starts_with("$argon2") {
        let parsed = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Stored Argon2 hash is malformed: {}", e);
                return false;
            }
        };
        return Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok();
    }

    match bcrypt::verify(password, hash) {
        Ok(valid) => valid,
        Err(e) => {
            warn!("Stored bcrypt hash is malformed: {}", e);
            false
        }
    }
}

/// Hash a password on the blocking pool
pub async fn hash_password_blocking(
    password: &str,
    scheme: PasswordScheme,
) -> Result<String, StoreError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash_password(&password, scheme))
        .await
        .map_err(|e| StoreError::Hash(format!("hashing task failed: {}", e)))?
}

/// Verify a password on the blocking pool
pub async fn verify_password_blocking(password: &str, hash: &str) -> Result<bool, StoreError> {
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| StoreError::Hash(format!("verification task failed: {}", e)))
}

/// Run one verification against a throwaway hash of `scheme` and discard the
/// result. Refusing an unknown username then costs as much as a wrong password.
pub async fn verify_decoy_blocking(password: &str, scheme: PasswordScheme) {
    let password = password.to_string();
    let _ = tokio::task::spawn_blocking(move || {
        if let Some(hash) = decoy_hash(scheme) {
            verify_password(&password, &hash);
        }
    })
    .await;
}

/// Throwaway hash per scheme, built on first use
fn decoy_hash(scheme: PasswordScheme) -> Option<String> {
    static DECOYS: OnceLock<DashMap<PasswordScheme, String>> = OnceLock::new();
    let decoys = DECOYS.get_or_init(DashMap::new);

    if let Some(hash) = decoys.get(&scheme) {
        return Some(hash.clone());
    }
    let hash = hash_password("realmgate-decoy", scheme).ok()?;
    decoys.insert(scheme, hash.clone());
    Some(hash)
}
