//! Account model and account store abstraction
//!
//! The gateway never owns account persistence. It talks to an
//! [`AccountStore`], which is either the in-memory store (development and
//! tests) or PostgreSQL.

pub mod memory;
pub mod password;
pub mod postgres;

use async_trait::async_trait;

use crate::error::StoreError;

pub use memory::MemoryAccountStore;
pub use password::{
    hash_password, hash_password_blocking, verify_decoy_blocking, verify_password,
    verify_password_blocking, PasswordScheme,
};
pub use postgres::PgAccountStore;

/// Access level of a banned account
pub const ACCESS_LEVEL_BANNED: i16 = -1;

/// Baseline access level, given to auto-created accounts
pub const ACCESS_LEVEL_PLAYER: i16 = 0;

/// Game master access level
pub const ACCESS_LEVEL_GM: i16 = 1;

/// Longest accepted username
pub const MAX_USERNAME_LEN: usize = 14;

/// Player account information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Unique account ID
    pub id: i64,
    /// Username (normalized)
    pub username: String,
    /// Password hash (bcrypt or Argon2 PHC string)
    pub password_hash: String,
    /// Access level, ordered; higher is more privileged
    pub access_level: i16,
}

impl Account {
    /// Verify the password against the stored hash
    pub fn verify_password(&self, password: &str) -> bool {
        verify_password(password, &self.password_hash)
    }

    /// Whether the account may enter realms flagged as testing
    pub fn is_elevated(&self) -> bool {
        self.access_level > ACCESS_LEVEL_PLAYER
    }
}

/// Lookup/insert interface over durable account storage
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Find an account by normalized username. `Ok(None)` means not found.
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError>;

    /// Insert a new account and return its id
    async fn insert(
        &self,
        username: &str,
        password_hash: &str,
        access_level: i16,
    ) -> Result<i64, StoreError>;
}

/// Normalize a username (trim, lowercase)
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

/// Check a normalized username: 1 to 14 ASCII letters or digits
pub fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username.len() <= MAX_USERNAME_LEN
        && username.chars().all(|c| c.is_ascii_alphanumeric())
}
