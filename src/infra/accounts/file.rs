//! File-backed account store using a JSON-lines table.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::{AccountStore, StoreError, UserAccount};
use crate::infra::jsonl::JsonlTable;

/// Accounts persisted to `accounts.jsonl`, cached in memory.
pub struct FileAccountStore {
    table: JsonlTable,
    accounts: Mutex<HashMap<String, UserAccount>>,
}

impl FileAccountStore {
    /// Open (or create) the store in `dir`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on I/O failure or corrupt rows.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let table = JsonlTable::open(dir, "accounts")?;
        let accounts = table
            .load::<UserAccount>()?
            .into_iter()
            .map(|a| (a.id.clone(), a))
            .collect();
        Ok(Self {
            table,
            accounts: Mutex::new(accounts),
        })
    }

    fn persist(&self, accounts: &HashMap<String, UserAccount>) -> Result<(), StoreError> {
        let mut rows: Vec<&UserAccount> = accounts.values().collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        self.table.rewrite(rows)
    }
}

#[async_trait]
impl AccountStore for FileAccountStore {
    async fn get(&self, id: &str) -> Result<Option<UserAccount>, StoreError> {
        Ok(self.accounts.lock().get(id).cloned())
    }

    async fn upsert(&self, account: UserAccount) -> Result<(), StoreError> {
        let mut accounts = self.accounts.lock();
        let id = account.id.clone();
        let previous = accounts.insert(id.clone(), account);
        if let Err(err) = self.persist(&accounts) {
            match previous {
                Some(old) => accounts.insert(id, old),
                None => accounts.remove(&id),
            };
            return Err(err);
        }
        Ok(())
    }

    async fn revoke_grant(&self, id: &str, resource: &str) -> Result<bool, StoreError> {
        let mut accounts = self.accounts.lock();
        let removed = accounts
            .get_mut(id)
            .is_some_and(|a| a.granted_resources.remove(resource));
        if !removed {
            return Ok(false);
        }
        if let Err(err) = self.persist(&accounts) {
            if let Some(account) = accounts.get_mut(id) {
                account.granted_resources.insert(resource.to_string());
            }
            return Err(err);
        }
        Ok(true)
    }
}
