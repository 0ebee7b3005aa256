//! Pool registry: search order, provisioning, and CAS capacity updates.
//!
//! Regions are an explicit, validated set fixed at construction. Pool
//! contents are never cached: every lookup and mutation re-reads the store,
//! and every mutation is a version-conditional write retried on conflict.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::core::pool::{PoolKey, PoolRecord, PoolStore, Scope};
use crate::core::store::{next_version, StoreBounds};
use crate::core::units::{Capacity, TOLERANCE_TB};
use crate::core::{EngineError, EngineResult};

/// Reserved scope name for the shared pool.
pub const GLOBAL_SCOPE: &str = "global";

/// Enumerates and mutates pools across the global scope and all regions.
pub struct PoolRegistry {
    store: Arc<dyn PoolStore>,
    regions: BTreeSet<String>,
    bounds: StoreBounds,
}

impl PoolRegistry {
    /// Create a registry over `store` for the given region identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for blank identifiers, identifiers
    /// containing whitespace, or the reserved name `global`.
    pub fn new<I, S>(store: Arc<dyn PoolStore>, regions: I, bounds: StoreBounds) -> EngineResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = BTreeSet::new();
        for region in regions {
            let region = region.into();
            validate_region_id(&region)?;
            set.insert(region);
        }
        Ok(Self {
            store,
            regions: set,
            bounds,
        })
    }

    /// Configured region identifiers.
    #[must_use]
    pub const fn regions(&self) -> &BTreeSet<String> {
        &self.regions
    }

    /// Resolve a region identifier against the configured set.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for an unknown region.
    pub fn region_scope(&self, region: &str) -> EngineResult<Scope> {
        if self.regions.contains(region) {
            Ok(Scope::Region(region.to_string()))
        } else {
            Err(EngineError::Validation(format!("unknown region `{region}`")))
        }
    }

    fn check_scope(&self, scope: &Scope) -> EngineResult<()> {
        match scope {
            Scope::Global => Ok(()),
            Scope::Region(r) => self.region_scope(r).map(|_| ()),
        }
    }

    /// Scopes in search order for a requester in `region`: own region, then
    /// global, then the remaining regions in lexicographic order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for an unknown region.
    pub fn search_order(&self, region: &str) -> EngineResult<Vec<Scope>> {
        let own = self.region_scope(region)?;
        let mut order = Vec::with_capacity(self.regions.len() + 1);
        order.push(own);
        order.push(Scope::Global);
        order.extend(
            self.regions
                .iter()
                .filter(|r| r.as_str() != region)
                .map(|r| Scope::Region(r.clone())),
        );
        Ok(order)
    }

    /// Existing pools for `resource`, in search order for `region`.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownResource`] if no scope has a pool for the
    /// resource; validation and store errors otherwise.
    pub async fn lookup(&self, resource: &str, region: &str) -> EngineResult<Vec<PoolKey>> {
        let mut found = Vec::new();
        for scope in self.search_order(region)? {
            let key = PoolKey::new(scope, resource);
            if self.get(&key).await?.is_some() {
                found.push(key);
            }
        }
        if found.is_empty() {
            return Err(EngineError::UnknownResource(resource.to_string()));
        }
        Ok(found)
    }

    /// Current record of one pool.
    ///
    /// # Errors
    ///
    /// Store failures and timeouts.
    pub async fn get(&self, key: &PoolKey) -> EngineResult<Option<PoolRecord>> {
        Ok(self.bounds.call("pool.get", self.store.get(key)).await?)
    }

    /// Every pool across all scopes, sorted by key.
    ///
    /// # Errors
    ///
    /// Store failures and timeouts.
    pub async fn snapshot(&self) -> EngineResult<Vec<PoolRecord>> {
        let mut pools = self.bounds.call("pool.list", self.store.list()).await?;
        pools.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(pools)
    }

    /// Every pool tracking `resource`, across all scopes.
    ///
    /// # Errors
    ///
    /// Store failures and timeouts.
    pub async fn pools_for_resource(&self, resource: &str) -> EngineResult<Vec<PoolRecord>> {
        let mut pools = self.snapshot().await?;
        pools.retain(|p| p.key.resource == resource);
        Ok(pools)
    }

    /// Sorted catalogue of resource names known to any pool.
    ///
    /// # Errors
    ///
    /// Store failures and timeouts.
    pub async fn resource_names(&self) -> EngineResult<BTreeSet<String>> {
        Ok(self
            .snapshot()
            .await?
            .into_iter()
            .map(|p| p.key.resource)
            .collect())
    }

    /// Apply `update` to the pool at `key` under a CAS retry loop.
    ///
    /// `update` returns `Ok(None)` to stop without writing.
    async fn update<F>(&self, key: &PoolKey, mut update: F) -> EngineResult<Option<PoolRecord>>
    where
        F: FnMut(Option<PoolRecord>) -> EngineResult<Option<PoolRecord>>,
    {
        for attempt in 0..self.bounds.max_cas_retries {
            let current = self.get(key).await?;
            let expected = current.as_ref().map(|p| p.version);
            let Some(mut next) = update(current)? else {
                return Ok(None);
            };
            let written = self
                .bounds
                .call("pool.compare_and_swap", self.store.compare_and_swap(next.clone(), expected))
                .await?;
            if written {
                next.version = next_version(expected);
                return Ok(Some(next));
            }
            debug!(pool = %key, attempt, "pool changed concurrently, retrying");
        }
        Err(self.bounds.conflict(format!("pool {key}")).into())
    }

    /// Atomically add `amount_tb` to the pool's allocation if it fits.
    ///
    /// Returns the updated record, or `None` when the pool is absent or lacks
    /// headroom.
    ///
    /// # Errors
    ///
    /// Store failures, timeouts, and exhausted CAS retries.
    pub async fn reserve(&self, key: &PoolKey, amount_tb: f64) -> EngineResult<Option<PoolRecord>> {
        self.update(key, |current| {
            Ok(current.filter(|p| p.fits(amount_tb)).map(|mut p| {
                p.allocated_tb = (p.allocated_tb + amount_tb).min(p.capacity_tb());
                p
            }))
        })
        .await
    }

    /// Atomically subtract `amount_tb` from the pool's allocation.
    ///
    /// # Errors
    ///
    /// [`EngineError::Release`] if the pool is absent or holds less than
    /// `amount_tb`; store failures otherwise.
    pub async fn unreserve(&self, key: &PoolKey, amount_tb: f64) -> EngineResult<PoolRecord> {
        let updated = self
            .update(key, |current| {
                let Some(mut pool) = current else {
                    return Err(EngineError::Release(format!("pool {key} no longer exists")));
                };
                if !pool.holds(amount_tb) {
                    return Err(EngineError::Release(format!(
                        "pool {key} holds {} TB, cannot release {amount_tb} TB",
                        pool.allocated_tb
                    )));
                }
                pool.allocated_tb = settle(pool.allocated_tb - amount_tb);
                Ok(Some(pool))
            })
            .await?;
        updated.ok_or_else(|| EngineError::Release(format!("pool {key} no longer exists")))
    }

    /// Zero the pool's allocation. Returns `None` if the pool is absent.
    ///
    /// # Errors
    ///
    /// Store failures, timeouts, and exhausted CAS retries.
    pub async fn reset(&self, key: &PoolKey) -> EngineResult<Option<PoolRecord>> {
        self.update(key, |current| {
            Ok(current.map(|mut p| {
                p.allocated_tb = 0.0;
                p
            }))
        })
        .await
    }

    /// Add capacity to a pool, creating it when absent.
    ///
    /// Added capacity is converted into the existing pool's declared unit.
    ///
    /// # Errors
    ///
    /// [`EngineError::Validation`] for an unknown scope, blank resource or
    /// non-positive capacity; store failures otherwise.
    pub async fn provision(&self, key: &PoolKey, added: Capacity) -> EngineResult<PoolRecord> {
        self.check_new_capacity(key, added)?;
        let record = self
            .update(key, |current| {
                Ok(Some(match current {
                    Some(mut pool) => {
                        pool.capacity.magnitude += added.in_unit(pool.capacity.unit);
                        pool
                    }
                    None => PoolRecord::new(key.clone(), added),
                }))
            })
            .await?;
        record.ok_or_else(|| EngineError::NotFound(format!("pool {key}")))
    }

    fn check_new_capacity(&self, key: &PoolKey, capacity: Capacity) -> EngineResult<()> {
        self.check_scope(&key.scope)?;
        if key.resource.trim().is_empty() {
            return Err(EngineError::Validation("resource name must not be empty".into()));
        }
        if !(capacity.magnitude.is_finite() && capacity.magnitude > 0.0) {
            return Err(EngineError::Validation(format!(
                "capacity must be positive, got {capacity}"
            )));
        }
        Ok(())
    }

    /// Create the pool with `capacity` unless it already exists. Returns
    /// whether it was created; an existing pool is left untouched.
    ///
    /// # Errors
    ///
    /// Validation and store errors, as for [`Self::provision`].
    pub async fn seed(&self, key: &PoolKey, capacity: Capacity) -> EngineResult<bool> {
        self.check_new_capacity(key, capacity)?;
        let record = PoolRecord::new(key.clone(), capacity);
        Ok(self
            .bounds
            .call("pool.compare_and_swap", self.store.compare_and_swap(record, None))
            .await?)
    }

    /// Remove an idle pool.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] if absent, [`EngineError::Validation`] while
    /// capacity is still allocated from it.
    pub async fn decommission(&self, key: &PoolKey) -> EngineResult<PoolRecord> {
        for attempt in 0..self.bounds.max_cas_retries {
            let Some(pool) = self.get(key).await? else {
                return Err(EngineError::NotFound(format!("pool {key}")));
            };
            if pool.allocated_tb > TOLERANCE_TB {
                return Err(EngineError::Validation(format!(
                    "pool {key} still has {} TB allocated",
                    pool.allocated_tb
                )));
            }
            let removed = self
                .bounds
                .call("pool.remove", self.store.remove(key, pool.version))
                .await?;
            if removed {
                return Ok(pool);
            }
            debug!(pool = %key, attempt, "pool changed during decommission, retrying");
        }
        Err(self.bounds.conflict(format!("pool {key}")).into())
    }
}

/// Snap float residue below the tolerance to exactly zero.
fn settle(allocated_tb: f64) -> f64 {
    if allocated_tb < TOLERANCE_TB {
        0.0
    } else {
        allocated_tb
    }
}

/// Validate a region identifier.
///
/// # Errors
///
/// Returns [`EngineError::Validation`] for blank identifiers, whitespace, or
/// the reserved global scope name.
pub fn validate_region_id(region: &str) -> EngineResult<()> {
    if region.is_empty() {
        return Err(EngineError::Validation("region id must not be empty".into()));
    }
    if region.chars().any(char::is_whitespace) {
        return Err(EngineError::Validation(format!(
            "region id `{region}` must not contain whitespace"
        )));
    }
    if region.eq_ignore_ascii_case(GLOBAL_SCOPE) {
        return Err(EngineError::Validation(format!(
            "`{GLOBAL_SCOPE}` is reserved for the shared pool"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::units::SizeUnit;
    use crate::infra::pools::InMemoryPoolStore;

    fn registry() -> PoolRegistry {
        PoolRegistry::new(
            Arc::new(InMemoryPoolStore::new()),
            ["us-east", "eu-west", "ap-south"],
            StoreBounds::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_search_order() {
        let reg = registry();
        let order = reg.search_order("eu-west").unwrap();
        assert_eq!(
            order,
            vec![
                Scope::Region("eu-west".into()),
                Scope::Global,
                Scope::Region("ap-south".into()),
                Scope::Region("us-east".into()),
            ]
        );
        assert!(matches!(
            reg.search_order("mars"),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_reserved_region() {
        let result = PoolRegistry::new(
            Arc::new(InMemoryPoolStore::new()),
            ["Global"],
            StoreBounds::default(),
        );
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn test_lookup_skips_missing_scopes() {
        let reg = registry();
        reg.provision(&PoolKey::global("disk"), Capacity::new(4.0, SizeUnit::Tb))
            .await
            .unwrap();
        reg.provision(&PoolKey::region("ap-south", "disk"), Capacity::new(1.0, SizeUnit::Tb))
            .await
            .unwrap();

        let keys = reg.lookup("disk", "us-east").await.unwrap();
        assert_eq!(
            keys,
            vec![PoolKey::global("disk"), PoolKey::region("ap-south", "disk")]
        );
        assert!(matches!(
            reg.lookup("gpu", "us-east").await,
            Err(EngineError::UnknownResource(_))
        ));
    }

    #[tokio::test]
    async fn test_provision_accumulates_in_pool_unit() {
        let reg = registry();
        let key = PoolKey::region("us-east", "disk");
        reg.provision(&key, Capacity::new(1.0, SizeUnit::Tb)).await.unwrap();
        let pool = reg
            .provision(&key, Capacity::new(512.0, SizeUnit::Gb))
            .await
            .unwrap();
        assert_eq!(pool.capacity, Capacity::new(1.5, SizeUnit::Tb));
        assert_eq!(pool.version, 2);
    }

    #[tokio::test]
    async fn test_seed_rejects_blank_resource() {
        let reg = registry();
        let blank = PoolKey::region("us-east", "  ");
        assert!(matches!(
            reg.seed(&blank, Capacity::new(1.0, SizeUnit::Tb)).await,
            Err(EngineError::Validation(_))
        ));
        assert!(reg.snapshot().await.unwrap().is_empty());

        let key = PoolKey::region("us-east", "disk");
        assert!(reg.seed(&key, Capacity::new(1.0, SizeUnit::Tb)).await.unwrap());
        assert!(!reg.seed(&key, Capacity::new(9.0, SizeUnit::Tb)).await.unwrap());
        assert_eq!(reg.get(&key).await.unwrap().unwrap().capacity_tb(), 1.0);
    }

    #[tokio::test]
    async fn test_reserve_and_unreserve() {
        let reg = registry();
        let key = PoolKey::global("disk");
        reg.provision(&key, Capacity::new(10.0, SizeUnit::Tb)).await.unwrap();

        let pool = reg.reserve(&key, 6.0).await.unwrap().unwrap();
        assert_eq!(pool.allocated_tb, 6.0);
        assert!(reg.reserve(&key, 5.0).await.unwrap().is_none());

        let pool = reg.unreserve(&key, 6.0).await.unwrap();
        assert_eq!(pool.allocated_tb, 0.0);
        assert!(matches!(
            reg.unreserve(&key, 1.0).await,
            Err(EngineError::Release(_))
        ));
    }

    #[tokio::test]
    async fn test_decommission_requires_idle_pool() {
        let reg = registry();
        let key = PoolKey::global("disk");
        reg.provision(&key, Capacity::new(1.0, SizeUnit::Tb)).await.unwrap();
        reg.reserve(&key, 0.5).await.unwrap();
        assert!(matches!(
            reg.decommission(&key).await,
            Err(EngineError::Validation(_))
        ));
        reg.reset(&key).await.unwrap();
        reg.decommission(&key).await.unwrap();
        assert!(reg.get(&key).await.unwrap().is_none());
        assert!(matches!(
            reg.decommission(&key).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resource_names_deduplicated() {
        let reg = registry();
        for key in [
            PoolKey::global("disk"),
            PoolKey::region("us-east", "disk"),
            PoolKey::region("eu-west", "archive"),
        ] {
            reg.provision(&key, Capacity::new(1.0, SizeUnit::Tb)).await.unwrap();
        }
        let names: Vec<_> = reg.resource_names().await.unwrap().into_iter().collect();
        assert_eq!(names, vec!["archive".to_string(), "disk".to_string()]);
    }
}
