//! In-memory account store
//!
//! Used when no database is configured and throughout the tests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::{Account, AccountStore};
use crate::error::StoreError;

/// Account store backed by a map
#[derive(Debug)]
pub struct MemoryAccountStore {
    /// username -> account
    accounts: RwLock<HashMap<String, Account>>,
    /// Next available account ID
    next_id: RwLock<i64>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            next_id: RwLock::new(1),
        }
    }

    /// Get an account without going through the async trait
    pub fn get(&self, username: &str) -> Option<Account> {
        self.accounts.read().get(username).cloned()
    }

    /// Get the number of stored accounts
    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.read().is_empty()
    }
}

impl Default for MemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.get(username))
    }

    async fn insert(
        &self,
        username: &str,
        password_hash: &str,
        access_level: i16,
    ) -> Result<i64, StoreError> {
        let mut accounts = self.accounts.write();
        if accounts.contains_key(username) {
            return Err(StoreError::DuplicateUsername(username.to_string()));
        }

        let id = {
            let mut next_id = self.next_id.write();
            let id = *next_id;
            *next_id += 1;
            id
        };

        accounts.insert(
            username.to_string(),
            Account {
                id,
                username: username.to_string(),
                password_hash: password_hash.to_string(),
                access_level,
            },
        );

        debug!(username = %username, id, "Account stored in memory");
        Ok(id)
    }
}
