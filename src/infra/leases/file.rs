//! File-backed lease store using a JSON-lines table.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{apply_cas, by_requester, expired, find_by_request_id};
use crate::core::{Lease, LeaseId, LeaseStore, StoreError};
use crate::infra::jsonl::JsonlTable;

/// Leases persisted to `leases.jsonl`, cached in memory.
pub struct FileLeaseStore {
    table: JsonlTable,
    leases: Mutex<HashMap<LeaseId, Lease>>,
}

impl FileLeaseStore {
    /// Open (or create) the store in `dir`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on I/O failure or corrupt rows.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let table = JsonlTable::open(dir, "leases")?;
        let leases = table
            .load::<Lease>()?
            .into_iter()
            .map(|l| (l.id, l))
            .collect();
        Ok(Self {
            table,
            leases: Mutex::new(leases),
        })
    }

    fn persist(&self, leases: &HashMap<LeaseId, Lease>) -> Result<(), StoreError> {
        let mut rows: Vec<&Lease> = leases.values().collect();
        rows.sort_by_key(|l| (l.created_at_ms, l.id));
        self.table.rewrite(rows)
    }
}

#[async_trait]
impl LeaseStore for FileLeaseStore {
    async fn get(&self, id: LeaseId) -> Result<Option<Lease>, StoreError> {
        Ok(self.leases.lock().get(&id).cloned())
    }

    async fn find_by_request_id(
        &self,
        requester_id: &str,
        request_id: &str,
    ) -> Result<Option<Lease>, StoreError> {
        Ok(find_by_request_id(&self.leases.lock(), requester_id, request_id).cloned())
    }

    async fn list_by_requester(&self, requester_id: &str) -> Result<Vec<Lease>, StoreError> {
        Ok(by_requester(&self.leases.lock(), requester_id))
    }

    async fn list_expired(&self, now_ms: u64) -> Result<Vec<Lease>, StoreError> {
        Ok(expired(&self.leases.lock(), now_ms))
    }

    async fn compare_and_swap(
        &self,
        lease: Lease,
        expected_version: Option<u64>,
    ) -> Result<bool, StoreError> {
        let mut leases = self.leases.lock();
        let id = lease.id;
        let Some(previous) = apply_cas(&mut leases, lease, expected_version) else {
            return Ok(false);
        };
        if let Err(err) = self.persist(&leases) {
            match previous {
                Some(old) => leases.insert(id, old),
                None => leases.remove(&id),
            };
            return Err(err);
        }
        Ok(true)
    }
}
