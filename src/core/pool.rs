//! Resource pool records and the pool store abstraction.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::units::{Capacity, TOLERANCE_TB};
use crate::core::StoreError;

/// Partition a pool belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// The single shared pool.
    Global,
    /// A region-scoped pool.
    Region(String),
}

impl Scope {
    /// Region identifier, if region-scoped.
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        match self {
            Self::Global => None,
            Self::Region(r) => Some(r),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Region(r) => f.write_str(r),
        }
    }
}

/// Identity of a pool: one resource inside one scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolKey {
    /// Scope of the pool.
    pub scope: Scope,
    /// Resource tracked by the pool.
    pub resource: String,
}

impl PoolKey {
    /// Build a key.
    pub fn new(scope: Scope, resource: impl Into<String>) -> Self {
        Self {
            scope,
            resource: resource.into(),
        }
    }

    /// Key of the global pool for `resource`.
    pub fn global(resource: impl Into<String>) -> Self {
        Self::new(Scope::Global, resource)
    }

    /// Key of the pool for `resource` in `region`.
    pub fn region(region: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::new(Scope::Region(region.into()), resource)
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.resource)
    }
}

/// Persisted state of one pool.
///
/// `allocated_tb` is always in TB regardless of the unit `capacity` was
/// declared in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolRecord {
    /// Pool identity.
    pub key: PoolKey,
    /// Declared capacity.
    pub capacity: Capacity,
    /// Capacity currently leased out, in TB.
    pub allocated_tb: f64,
    /// Optimistic concurrency version, assigned by the store.
    pub version: u64,
}

impl PoolRecord {
    /// New, empty pool.
    #[must_use]
    pub const fn new(key: PoolKey, capacity: Capacity) -> Self {
        Self {
            key,
            capacity,
            allocated_tb: 0.0,
            version: 0,
        }
    }

    /// Capacity in TB.
    #[must_use]
    pub fn capacity_tb(&self) -> f64 {
        self.capacity.to_canonical()
    }

    /// Free capacity in TB.
    #[must_use]
    pub fn headroom_tb(&self) -> f64 {
        (self.capacity_tb() - self.allocated_tb).max(0.0)
    }

    /// Whether `amount_tb` more can be allocated without exceeding capacity.
    #[must_use]
    pub fn fits(&self, amount_tb: f64) -> bool {
        self.allocated_tb + amount_tb <= self.capacity_tb() + TOLERANCE_TB
    }

    /// Whether `amount_tb` can be released from this pool.
    #[must_use]
    pub fn holds(&self, amount_tb: f64) -> bool {
        self.allocated_tb + TOLERANCE_TB >= amount_tb
    }
}

/// Storage backend for pool records.
///
/// Writes are conditional on the record version so concurrent allocators,
/// releasers and the reclaimer can never both apply a change computed from the
/// same snapshot.
#[async_trait]
pub trait PoolStore: Send + Sync {
    /// Fetch one pool.
    async fn get(&self, key: &PoolKey) -> Result<Option<PoolRecord>, StoreError>;

    /// Every pool across all scopes.
    async fn list(&self) -> Result<Vec<PoolRecord>, StoreError>;

    /// Conditionally write `record`.
    ///
    /// `expected_version` of `None` means the key must be absent. On success
    /// the stored version becomes [`next_version`](crate::core::next_version)
    /// of the expectation and `true` is returned; a version mismatch returns
    /// `false` without writing.
    async fn compare_and_swap(
        &self,
        record: PoolRecord,
        expected_version: Option<u64>,
    ) -> Result<bool, StoreError>;

    /// Remove a pool if its version still matches.
    async fn remove(&self, key: &PoolKey, expected_version: u64) -> Result<bool, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::units::SizeUnit;

    #[test]
    fn test_fits_and_headroom() {
        let mut pool = PoolRecord::new(PoolKey::global("disk"), Capacity::new(10.0, SizeUnit::Tb));
        pool.allocated_tb = 2.0;
        assert!(pool.fits(8.0));
        assert!(!pool.fits(8.5));
        assert_eq!(pool.headroom_tb(), 8.0);
        assert!(pool.holds(2.0));
        assert!(!pool.holds(2.5));
    }

    #[test]
    fn test_capacity_in_other_unit() {
        let pool = PoolRecord::new(
            PoolKey::region("us-east", "disk"),
            Capacity::new(2048.0, SizeUnit::Gb),
        );
        assert_eq!(pool.capacity_tb(), 2.0);
        assert_eq!(pool.key.to_string(), "us-east/disk");
    }

    #[test]
    fn test_scope_serde() {
        let json = serde_json::to_string(&Scope::Global).unwrap();
        assert_eq!(json, "\"global\"");
        let json = serde_json::to_string(&Scope::Region("eu".into())).unwrap();
        assert_eq!(json, "{\"region\":\"eu\"}");
    }
}
