//! File-backed pool store using a JSON-lines table.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{apply_cas, apply_remove};
use crate::core::{PoolKey, PoolRecord, PoolStore, StoreError};
use crate::infra::jsonl::JsonlTable;

/// Pools persisted to `pools.jsonl`, cached in memory.
pub struct FilePoolStore {
    table: JsonlTable,
    pools: Mutex<HashMap<PoolKey, PoolRecord>>,
}

impl FilePoolStore {
    /// Open (or create) the store in `dir`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on I/O failure or corrupt rows.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let table = JsonlTable::open(dir, "pools")?;
        let pools = table
            .load::<PoolRecord>()?
            .into_iter()
            .map(|p| (p.key.clone(), p))
            .collect();
        Ok(Self {
            table,
            pools: Mutex::new(pools),
        })
    }

    fn persist(&self, pools: &HashMap<PoolKey, PoolRecord>) -> Result<(), StoreError> {
        let mut rows: Vec<&PoolRecord> = pools.values().collect();
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        self.table.rewrite(rows)
    }
}

#[async_trait]
impl PoolStore for FilePoolStore {
    async fn get(&self, key: &PoolKey) -> Result<Option<PoolRecord>, StoreError> {
        Ok(self.pools.lock().get(key).cloned())
    }

    async fn list(&self) -> Result<Vec<PoolRecord>, StoreError> {
        Ok(self.pools.lock().values().cloned().collect())
    }

    async fn compare_and_swap(
        &self,
        record: PoolRecord,
        expected_version: Option<u64>,
    ) -> Result<bool, StoreError> {
        let mut pools = self.pools.lock();
        let key = record.key.clone();
        let Some(previous) = apply_cas(&mut pools, record, expected_version) else {
            return Ok(false);
        };
        if let Err(err) = self.persist(&pools) {
            match previous {
                Some(old) => pools.insert(key, old),
                None => pools.remove(&key),
            };
            return Err(err);
        }
        Ok(true)
    }

    async fn remove(&self, key: &PoolKey, expected_version: u64) -> Result<bool, StoreError> {
        let mut pools = self.pools.lock();
        let Some(removed) = apply_remove(&mut pools, key, expected_version) else {
            return Ok(false);
        };
        if let Err(err) = self.persist(&pools) {
            pools.insert(key.clone(), removed);
            return Err(err);
        }
        Ok(true)
    }
}
