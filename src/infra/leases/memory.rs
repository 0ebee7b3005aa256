//! In-memory lease store for development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{apply_cas, by_requester, expired, find_by_request_id};
use crate::core::{Lease, LeaseId, LeaseStore, StoreError};

/// Leases held in a mutex-guarded map.
#[derive(Default)]
pub struct InMemoryLeaseStore {
    leases: Mutex<HashMap<LeaseId, Lease>>,
}

impl InMemoryLeaseStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored lease, in no particular order.
    #[must_use]
    pub fn all(&self) -> Vec<Lease> {
        self.leases.lock().values().cloned().collect()
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
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
        Ok(apply_cas(&mut self.leases.lock(), lease, expected_version).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LeaseStatus, PoolKey, SizeUnit};

    fn lease(requester: &str, release_at_ms: u64, request_id: Option<&str>) -> Lease {
        Lease {
            id: LeaseId::new(),
            request_id: request_id.map(str::to_string),
            requester_id: requester.into(),
            requester_region: "us-east".into(),
            resource: "disk".into(),
            magnitude: 1.0,
            unit: SizeUnit::Tb,
            amount_tb: 1.0,
            backing_pool: PoolKey::global("disk"),
            duration_hours: 0,
            duration_minutes: 0,
            created_at_ms: 0,
            release_at_ms,
            closed_at_ms: None,
            status: LeaseStatus::Allocated,
            release_pending: false,
            version: 0,
        }
    }

    #[tokio::test]
    async fn test_duplicate_request_id_rejected_on_insert() {
        let store = InMemoryLeaseStore::new();
        assert!(store
            .compare_and_swap(lease("alice", 10, Some("r-1")), None)
            .await
            .unwrap());
        assert!(!store
            .compare_and_swap(lease("alice", 10, Some("r-1")), None)
            .await
            .unwrap());
        // Same key from another requester is independent.
        assert!(store
            .compare_and_swap(lease("bob", 10, Some("r-1")), None)
            .await
            .unwrap());
        assert!(store.find_by_request_id("alice", "r-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_expired_only_allocated_and_due() {
        let store = InMemoryLeaseStore::new();
        let due = lease("alice", 100, None);
        let later = lease("alice", 500, None);
        let mut released = lease("alice", 50, None);
        released.status = LeaseStatus::Released;
        for l in [due.clone(), later, released] {
            store.compare_and_swap(l, None).await.unwrap();
        }
        let expired = store.list_expired(100).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, due.id);
    }
}
