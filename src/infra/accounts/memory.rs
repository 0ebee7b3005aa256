//! In-memory account store.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::{AccountStore, StoreError, UserAccount};

/// Accounts held in a mutex-guarded map.
#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: Mutex<HashMap<String, UserAccount>>,
}

impl InMemoryAccountStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `accounts`.
    pub fn with_accounts(accounts: impl IntoIterator<Item = UserAccount>) -> Self {
        Self {
            accounts: Mutex::new(accounts.into_iter().map(|a| (a.id.clone(), a)).collect()),
        }
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn get(&self, id: &str) -> Result<Option<UserAccount>, StoreError> {
        Ok(self.accounts.lock().get(id).cloned())
    }

    async fn upsert(&self, account: UserAccount) -> Result<(), StoreError> {
        self.accounts.lock().insert(account.id.clone(), account);
        Ok(())
    }

    async fn revoke_grant(&self, id: &str, resource: &str) -> Result<bool, StoreError> {
        Ok(self
            .accounts
            .lock()
            .get_mut(id)
            .is_some_and(|a| a.granted_resources.remove(resource)))
    }
}
