//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use capacity_lease::core::{
    AccountStore, Capacity, CapacityEngine, Lease, LeaseId, LeaseStore, PoolKey, PoolRecord,
    PoolRegistry, PoolStore, RequestContext, Role, SizeUnit, StoreBounds, StoreError, UserAccount,
};
use parking_lot::Mutex;
use capacity_lease::infra::{InMemoryAccountStore, InMemoryLeaseStore, InMemoryPoolStore};
use capacity_lease::util::ManualClock;

pub const US: &str = "us-east";
pub const EU: &str = "eu-west";
pub const AP: &str = "ap-south";

/// Arbitrary fixed start instant for manual clocks.
pub const T0: u64 = 1_700_000_000_000;
pub const MINUTE_MS: u64 = 60_000;

pub struct Fixture {
    pub engine: Arc<CapacityEngine>,
    pub clock: ManualClock,
    pub pools: Arc<FlakyPoolStore>,
    pub accounts: Arc<InMemoryAccountStore>,
}

pub fn fixture() -> Fixture {
    fixture_with_leases(Arc::new(InMemoryLeaseStore::new()))
}

pub fn fixture_with_leases(leases: Arc<dyn LeaseStore>) -> Fixture {
    let pools = Arc::new(FlakyPoolStore::default());
    let accounts = Arc::new(InMemoryAccountStore::new());
    let clock = ManualClock::new(T0);
    let registry = PoolRegistry::new(pools.clone(), [US, EU, AP], StoreBounds::default())
        .expect("valid regions");
    let engine = CapacityEngine::new(registry, leases, accounts.clone(), StoreBounds::default())
        .with_clock(Arc::new(clock.clone()));
    Fixture {
        engine: Arc::new(engine),
        clock,
        pools,
        accounts,
    }
}

impl Fixture {
    pub async fn provision(&self, key: &PoolKey, tb: f64) {
        self.engine
            .registry()
            .provision(key, Capacity::new(tb, SizeUnit::Tb))
            .await
            .expect("provision");
    }

    pub async fn allocated_tb(&self, key: &PoolKey) -> f64 {
        self.engine
            .registry()
            .get(key)
            .await
            .expect("get pool")
            .expect("pool exists")
            .allocated_tb
    }

    pub async fn add_account(&self, id: &str, region: &str, grants: &[&str]) -> RequestContext {
        let mut account = UserAccount::new(id, region, Role::User);
        for grant in grants {
            account = account.with_grant(*grant);
        }
        self.accounts.upsert(account).await.expect("upsert");
        RequestContext::new(id, region)
    }
}

pub fn ctx(requester: &str, region: &str) -> RequestContext {
    RequestContext::new(requester, region)
}

/// Lease store whose inserts can be made to fail on demand.
#[derive(Default)]
pub struct FlakyLeaseStore {
    inner: InMemoryLeaseStore,
    fail_writes: AtomicBool,
}

impl FlakyLeaseStore {
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LeaseStore for FlakyLeaseStore {
    async fn get(&self, id: LeaseId) -> Result<Option<Lease>, StoreError> {
        self.inner.get(id).await
    }

    async fn find_by_request_id(
        &self,
        requester_id: &str,
        request_id: &str,
    ) -> Result<Option<Lease>, StoreError> {
        self.inner.find_by_request_id(requester_id, request_id).await
    }

    async fn list_by_requester(&self, requester_id: &str) -> Result<Vec<Lease>, StoreError> {
        self.inner.list_by_requester(requester_id).await
    }

    async fn list_expired(&self, now_ms: u64) -> Result<Vec<Lease>, StoreError> {
        self.inner.list_expired(now_ms).await
    }

    async fn compare_and_swap(
        &self,
        lease: Lease,
        expected_version: Option<u64>,
    ) -> Result<bool, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected write failure".into()));
        }
        self.inner.compare_and_swap(lease, expected_version).await
    }
}

/// Lease store whose expiry scan takes `delay`.
pub struct SlowLeaseStore {
    inner: InMemoryLeaseStore,
    delay: Duration,
}

impl SlowLeaseStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: InMemoryLeaseStore::new(),
            delay,
        }
    }
}

#[async_trait]
impl LeaseStore for SlowLeaseStore {
    async fn get(&self, id: LeaseId) -> Result<Option<Lease>, StoreError> {
        self.inner.get(id).await
    }

    async fn find_by_request_id(
        &self,
        requester_id: &str,
        request_id: &str,
    ) -> Result<Option<Lease>, StoreError> {
        self.inner.find_by_request_id(requester_id, request_id).await
    }

    async fn list_by_requester(&self, requester_id: &str) -> Result<Vec<Lease>, StoreError> {
        self.inner.list_by_requester(requester_id).await
    }

    async fn list_expired(&self, now_ms: u64) -> Result<Vec<Lease>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.list_expired(now_ms).await
    }

    async fn compare_and_swap(
        &self,
        lease: Lease,
        expected_version: Option<u64>,
    ) -> Result<bool, StoreError> {
        self.inner.compare_and_swap(lease, expected_version).await
    }
}

/// Pool store whose writes to one chosen pool can be made to fail.
#[derive(Default)]
pub struct FlakyPoolStore {
    inner: InMemoryPoolStore,
    failing: Mutex<Option<PoolKey>>,
}

impl FlakyPoolStore {
    pub fn fail_writes_to(&self, key: Option<PoolKey>) {
        *self.failing.lock() = key;
    }
}

#[async_trait]
impl PoolStore for FlakyPoolStore {
    async fn get(&self, key: &PoolKey) -> Result<Option<PoolRecord>, StoreError> {
        self.inner.get(key).await
    }

    async fn list(&self) -> Result<Vec<PoolRecord>, StoreError> {
        self.inner.list().await
    }

    async fn compare_and_swap(
        &self,
        record: PoolRecord,
        expected_version: Option<u64>,
    ) -> Result<bool, StoreError> {
        if self.failing.lock().as_ref() == Some(&record.key) {
            return Err(StoreError::Backend(format!("injected write failure on {}", record.key)));
        }
        self.inner.compare_and_swap(record, expected_version).await
    }

    async fn remove(&self, key: &PoolKey, expected_version: u64) -> Result<bool, StoreError> {
        self.inner.remove(key, expected_version).await
    }
}
