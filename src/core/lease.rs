//! Lease records, lifecycle, and the lease store abstraction.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::pool::PoolKey;
use crate::core::units::SizeUnit;
use crate::core::StoreError;

/// Unique lease identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseId(pub Uuid);

impl LeaseId {
    /// Fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LeaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Status of a lease in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseStatus {
    /// Capacity is held against the backing pool.
    Allocated,
    /// Capacity was returned by an explicit release.
    Released,
    /// A release was attempted and the capacity could not be returned yet.
    NotReleased,
    /// The reclaimer expired the lease.
    Removed,
}

impl LeaseStatus {
    /// Terminal states accept no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Released | Self::Removed)
    }

    /// Whether an explicit release may start from this state.
    #[must_use]
    pub const fn is_releasable(self) -> bool {
        matches!(self, Self::Allocated | Self::NotReleased)
    }

    /// Whether moving to `next` is a legal lifecycle step.
    ///
    /// `allocated -> allocated` and `not_released -> not_released` are the
    /// claim and unclaim writes that only toggle the pending marker.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match self {
            Self::NotReleased => matches!(next, Self::NotReleased | Self::Released),
            _ => true,
        }
    }
}

impl fmt::Display for LeaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Allocated => "allocated",
            Self::Released => "released",
            Self::NotReleased => "not_released",
            Self::Removed => "removed",
        };
        f.write_str(s)
    }
}

/// A time-bounded grant of capacity against one pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lease {
    /// Lease identifier.
    pub id: LeaseId,
    /// Caller-supplied idempotency key.
    pub request_id: Option<String>,
    /// Requester identity.
    pub requester_id: String,
    /// Region the requester belongs to.
    pub requester_region: String,
    /// Resource name.
    pub resource: String,
    /// Requested magnitude, in `unit`.
    pub magnitude: f64,
    /// Unit of the request.
    pub unit: SizeUnit,
    /// Requested magnitude converted to TB.
    pub amount_tb: f64,
    /// Pool the capacity was taken from.
    pub backing_pool: PoolKey,
    /// Requested duration, hours part.
    pub duration_hours: u8,
    /// Requested duration, minutes part.
    pub duration_minutes: u8,
    /// Creation time (ms since epoch).
    pub created_at_ms: u64,
    /// Instant the lease becomes eligible for reclamation (ms since epoch).
    pub release_at_ms: u64,
    /// When the lease reached `released` or `removed`.
    pub closed_at_ms: Option<u64>,
    /// Lifecycle status.
    pub status: LeaseStatus,
    /// Set while a release or an expiry sweep holds the claim on this lease.
    #[serde(default)]
    pub release_pending: bool,
    /// Optimistic concurrency version, assigned by the store.
    pub version: u64,
}

impl Lease {
    /// Whether the release time has been reached at `now_ms`.
    #[must_use]
    pub const fn is_due(&self, now_ms: u64) -> bool {
        self.release_at_ms <= now_ms
    }

    /// Milliseconds until the release time; zero once due.
    #[must_use]
    pub const fn remaining_ms(&self, now_ms: u64) -> u64 {
        self.release_at_ms.saturating_sub(now_ms)
    }

    /// Whether a release may pick this lease up right now.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.status.is_releasable() && !self.release_pending
    }

}

/// How a release call identifies its lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseSelector {
    /// An exact lease.
    Id(LeaseId),
    /// The requester's single active lease on this resource.
    Resource(String),
}

/// Storage backend for leases.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Fetch one lease.
    async fn get(&self, id: LeaseId) -> Result<Option<Lease>, StoreError>;

    /// Lease created by `requester_id` with idempotency key `request_id`.
    async fn find_by_request_id(
        &self,
        requester_id: &str,
        request_id: &str,
    ) -> Result<Option<Lease>, StoreError>;

    /// All leases of a requester, in any status.
    async fn list_by_requester(&self, requester_id: &str) -> Result<Vec<Lease>, StoreError>;

    /// `allocated` leases whose release time is at or before `now_ms`.
    async fn list_expired(&self, now_ms: u64) -> Result<Vec<Lease>, StoreError>;

    /// Conditionally write `lease`; same contract as
    /// [`PoolStore::compare_and_swap`](crate::core::PoolStore::compare_and_swap).
    ///
    /// Inserting a lease whose `(requester_id, request_id)` pair is already
    /// taken by another lease also returns `false`.
    async fn compare_and_swap(
        &self,
        lease: Lease,
        expected_version: Option<u64>,
    ) -> Result<bool, StoreError>;
}
