//! Expiry sweep over leases whose release time has passed.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::CapacityEngine;
use crate::core::audit::AuditAction;
use crate::core::lease::{Lease, LeaseStatus};
use crate::core::{EngineResult, StoreError};

/// How an expired lease gives its capacity back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReclaimPolicy {
    /// Subtract only the lease's own amount from its backing pool.
    #[default]
    DecrementLease,
    /// Zero `allocated` on every pool of the lease's resource. This also
    /// erases the usage of other live leases on those pools.
    ResetPool,
}

impl fmt::Display for ReclaimPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DecrementLease => f.write_str("decrement_lease"),
            Self::ResetPool => f.write_str("reset_pool"),
        }
    }
}

/// Outcome counters of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimReport {
    /// Expired `allocated` leases found.
    pub scanned: usize,
    /// Leases moved to `removed`.
    pub reclaimed: usize,
    /// Leases another actor changed first.
    pub skipped: usize,
    /// Leases whose reclamation hit an error.
    pub failed: usize,
}

impl CapacityEngine {
    /// Remove every `allocated` lease whose release time has passed.
    ///
    /// Each lease is claimed with a version CAS before capacity is returned,
    /// so running sweeps concurrently (or racing a release) is safe. Errors
    /// on individual leases are logged and counted; the sweep continues and
    /// the failed lease stays eligible for the next one.
    ///
    /// # Errors
    ///
    /// Only when the expired set cannot be listed.
    pub async fn reclaim_expired(&self) -> EngineResult<ReclaimReport> {
        let now = self.now_ms();
        let expired = self
            .bounds
            .call("lease.list_expired", self.leases.list_expired(now))
            .await?;

        let mut report = ReclaimReport {
            scanned: expired.len(),
            ..ReclaimReport::default()
        };
        for lease in expired {
            let id = lease.id;
            match self.reclaim_one(lease, now).await {
                Ok(true) => report.reclaimed += 1,
                Ok(false) => report.skipped += 1,
                Err(err) => {
                    error!(lease_id = %id, error = %err, "failed to reclaim expired lease");
                    report.failed += 1;
                }
            }
        }
        if report.scanned > 0 {
            info!(
                scanned = report.scanned,
                reclaimed = report.reclaimed,
                skipped = report.skipped,
                failed = report.failed,
                "expiry sweep finished"
            );
        }
        Ok(report)
    }

    /// Reclaim one lease. `Ok(false)` means another actor claimed it first.
    ///
    /// The lease is claimed in place (still `allocated`, pending marker set),
    /// the grant is revoked, capacity is returned, and only then is the lease
    /// moved to `removed`. Any error puts the lease back unclaimed so the next
    /// sweep retries it. Revoking is idempotent and runs before the capacity
    /// return, so a retry never returns the same capacity twice.
    async fn reclaim_one(&self, lease: Lease, now: u64) -> EngineResult<bool> {
        if lease.status != LeaseStatus::Allocated || lease.release_pending || !lease.is_due(now) {
            return Ok(false);
        }
        let claim = Lease {
            release_pending: true,
            ..lease.clone()
        };
        let Some(claimed) = self.write_lease(claim, Some(&lease)).await? else {
            debug!(lease_id = %lease.id, "lease changed before reclaim, skipping");
            return Ok(false);
        };

        let revoked = match self.return_expired(&claimed).await {
            Ok(revoked) => revoked,
            Err(err) => {
                self.unclaim(&claimed).await;
                return Err(err);
            }
        };

        let removed = Lease {
            status: LeaseStatus::Removed,
            release_pending: false,
            closed_at_ms: Some(now),
            ..claimed.clone()
        };
        let removed = self
            .write_lease(removed, Some(&claimed))
            .await?
            .ok_or_else(|| StoreError::Conflict(format!("lease {} claim lost", claimed.id)))?;
        info!(
            lease_id = %removed.id,
            pool = %removed.backing_pool,
            amount_tb = removed.amount_tb,
            policy = %self.reclaim_policy,
            grant_revoked = revoked,
            "expired lease reclaimed"
        );
        self.record_audit(&removed, AuditAction::Reclaim, None);
        Ok(true)
    }

    /// Revoke the grant, then give the capacity back under the active policy.
    async fn return_expired(&self, lease: &Lease) -> EngineResult<bool> {
        let revoked = self
            .bounds
            .call(
                "account.revoke_grant",
                self.accounts.revoke_grant(&lease.requester_id, &lease.resource),
            )
            .await?;
        match self.reclaim_policy {
            ReclaimPolicy::DecrementLease => {
                self.registry
                    .unreserve(&lease.backing_pool, lease.amount_tb)
                    .await?;
            }
            ReclaimPolicy::ResetPool => {
                warn!(
                    resource = %lease.resource,
                    lease_id = %lease.id,
                    "resetting every pool of resource, other leases' usage is discarded"
                );
                for pool in self.registry.pools_for_resource(&lease.resource).await? {
                    self.registry.reset(&pool.key).await?;
                }
            }
        }
        Ok(revoked)
    }

    /// Drop the sweep's claim so a later sweep picks the lease up again.
    async fn unclaim(&self, claimed: &Lease) {
        let retry = Lease {
            release_pending: false,
            ..claimed.clone()
        };
        match self.write_lease(retry, Some(claimed)).await {
            Ok(Some(_)) => debug!(lease_id = %claimed.id, "reclaim claim dropped for retry"),
            Ok(None) => warn!(lease_id = %claimed.id, "reclaim claim changed underneath the sweep"),
            Err(err) => error!(
                lease_id = %claimed.id,
                error = %err,
                "could not drop reclaim claim, lease stays pending"
            ),
        }
    }
}
