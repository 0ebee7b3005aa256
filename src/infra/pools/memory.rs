//! In-memory pool store for development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{apply_cas, apply_remove};
use crate::core::{PoolKey, PoolRecord, PoolStore, StoreError};

/// Pools held in a mutex-guarded map.
#[derive(Default)]
pub struct InMemoryPoolStore {
    pools: Mutex<HashMap<PoolKey, PoolRecord>>,
}

impl InMemoryPoolStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pools stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.lock().len()
    }

    /// Whether no pool is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.lock().is_empty()
    }
}

#[async_trait]
impl PoolStore for InMemoryPoolStore {
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
        Ok(apply_cas(&mut self.pools.lock(), record, expected_version).is_some())
    }

    async fn remove(&self, key: &PoolKey, expected_version: u64) -> Result<bool, StoreError> {
        Ok(apply_remove(&mut self.pools.lock(), key, expected_version).is_some())
    }
}
