//! Explicit release of leases by their requester.

use tracing::{info, warn};

use super::CapacityEngine;
use crate::core::account::RequestContext;
use crate::core::audit::AuditAction;
use crate::core::lease::{Lease, LeaseSelector, LeaseStatus};
use crate::core::{EngineError, EngineResult, StoreError};

impl CapacityEngine {
    /// Return a lease's capacity to the pool that backs it.
    ///
    /// The lease is first claimed (`not_released` with the pending marker)
    /// so concurrent releases and the reclaimer cannot return the same
    /// capacity twice. If the pool cannot take the capacity back the lease
    /// stays `not_released` and may be released again later.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] when the selector matches nothing the
    ///   caller owns in their region.
    /// - [`EngineError::Validation`] when a resource name is ambiguous.
    /// - [`EngineError::InvalidState`] for leases already released, removed,
    ///   or mid-release.
    /// - [`EngineError::Release`] when the backing pool cannot take the
    ///   capacity back.
    pub async fn release(&self, ctx: &RequestContext, selector: LeaseSelector) -> EngineResult<Lease> {
        ctx.validate()?;
        self.registry.region_scope(&ctx.region)?;

        let lease = self.resolve(ctx, &selector).await?;
        if !lease.status.is_releasable() {
            return Err(EngineError::InvalidState(format!(
                "lease {} is already {}",
                lease.id, lease.status
            )));
        }
        if lease.release_pending {
            return Err(EngineError::InvalidState(format!(
                "lease {} has a release or reclaim in progress",
                lease.id
            )));
        }

        let claim = Lease {
            status: LeaseStatus::NotReleased,
            release_pending: true,
            ..lease.clone()
        };
        let Some(claimed) = self.write_lease(claim, Some(&lease)).await? else {
            return Err(StoreError::Conflict(format!("lease {} changed concurrently", lease.id)).into());
        };

        match self.registry.unreserve(&claimed.backing_pool, claimed.amount_tb).await {
            Ok(pool) => {
                let done = Lease {
                    status: LeaseStatus::Released,
                    release_pending: false,
                    closed_at_ms: Some(self.now_ms()),
                    ..claimed.clone()
                };
                let released = self
                    .write_lease(done, Some(&claimed))
                    .await?
                    .ok_or_else(|| StoreError::Conflict(format!("lease {} claim lost", claimed.id)))?;
                info!(
                    lease_id = %released.id,
                    pool = %pool.key,
                    amount_tb = released.amount_tb,
                    allocated_tb = pool.allocated_tb,
                    "capacity released"
                );
                self.record_audit(&released, AuditAction::Release, None);
                Ok(released)
            }
            Err(err) => {
                warn!(lease_id = %claimed.id, pool = %claimed.backing_pool, error = %err, "release failed");
                let failed = Lease {
                    release_pending: false,
                    ..claimed.clone()
                };
                self.write_lease(failed, Some(&claimed)).await?;
                self.record_audit(&claimed, AuditAction::ReleaseFailed, Some(err.to_string()));
                Err(err)
            }
        }
    }

    /// The requester's `allocated` leases in their region, oldest first.
    ///
    /// # Errors
    ///
    /// Validation and store errors.
    pub async fn active_leases(&self, ctx: &RequestContext) -> EngineResult<Vec<Lease>> {
        ctx.validate()?;
        let mut leases = self.leases_for(&ctx.requester_id).await?;
        leases.retain(|l| l.requester_region == ctx.region && l.status == LeaseStatus::Allocated);
        Ok(leases)
    }

    async fn resolve(&self, ctx: &RequestContext, selector: &LeaseSelector) -> EngineResult<Lease> {
        match selector {
            LeaseSelector::Id(id) => self
                .lease(*id)
                .await?
                .filter(|l| l.requester_id == ctx.requester_id && l.requester_region == ctx.region)
                .ok_or_else(|| EngineError::NotFound(format!("lease {id}"))),
            LeaseSelector::Resource(resource) => {
                let mut matches: Vec<Lease> = self
                    .leases_for(&ctx.requester_id)
                    .await?
                    .into_iter()
                    .filter(|l| {
                        l.requester_region == ctx.region && &l.resource == resource && l.is_active()
                    })
                    .collect();
                match matches.len() {
                    0 => Err(EngineError::NotFound(format!(
                        "no active lease on `{resource}` for {}",
                        ctx.requester_id
                    ))),
                    1 => Ok(matches.remove(0)),
                    n => Err(EngineError::Validation(format!(
                        "{n} active leases on `{resource}`, release by lease id"
                    ))),
                }
            }
        }
    }
}
