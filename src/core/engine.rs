//! Capacity engine: allocation, lease queries and shared helpers.
//!
//! The engine is stateless over its stores. Release and reclamation live in
//! the [`release`] and [`reclaim`] submodules as further `impl` blocks.

mod reclaim;
mod release;

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::core::account::{AccountStore, RequestContext};
use crate::core::audit::{build_audit_event, AuditAction, AuditSink};
use crate::core::lease::{Lease, LeaseId, LeaseStatus, LeaseStore};
use crate::core::registry::PoolRegistry;
use crate::core::store::{next_version, StoreBounds};
use crate::core::units::{Capacity, SizeUnit};
use crate::core::{EngineError, EngineResult, StoreError};
use crate::util::clock::{Clock, SystemClock};

pub use reclaim::{ReclaimPolicy, ReclaimReport};

const MS_PER_MINUTE: u64 = 60_000;

/// A request for capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRequest {
    /// Resource name.
    pub resource: String,
    /// Requested amount in `unit`.
    pub magnitude: f64,
    /// Unit of `magnitude`.
    pub unit: SizeUnit,
    /// Lease duration, hours part (0..=23).
    pub duration_hours: u8,
    /// Lease duration, minutes part (0..=59).
    pub duration_minutes: u8,
    /// Idempotency key; a retry with the same key returns the first lease.
    #[serde(default)]
    pub request_id: Option<String>,
}

impl AllocationRequest {
    /// Request without an idempotency key.
    pub fn new(
        resource: impl Into<String>,
        magnitude: f64,
        unit: SizeUnit,
        duration_hours: u8,
        duration_minutes: u8,
    ) -> Self {
        Self {
            resource: resource.into(),
            magnitude,
            unit,
            duration_hours,
            duration_minutes,
            request_id: None,
        }
    }

    /// Attach an idempotency key.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Validate request fields.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] describing the first bad field.
    pub fn validate(&self) -> EngineResult<()> {
        if self.resource.trim().is_empty() {
            return Err(EngineError::Validation("resource must not be empty".into()));
        }
        if !(self.magnitude.is_finite() && self.magnitude > 0.0) {
            return Err(EngineError::Validation(format!(
                "size must be a positive number, got {}",
                self.magnitude
            )));
        }
        if self.duration_hours > 23 {
            return Err(EngineError::Validation(format!(
                "hours must be within 0..=23, got {}",
                self.duration_hours
            )));
        }
        if self.duration_minutes > 59 {
            return Err(EngineError::Validation(format!(
                "minutes must be within 0..=59, got {}",
                self.duration_minutes
            )));
        }
        if matches!(&self.request_id, Some(id) if id.trim().is_empty()) {
            return Err(EngineError::Validation("request id must not be blank".into()));
        }
        Ok(())
    }

    /// Requested duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        (u64::from(self.duration_hours) * 60 + u64::from(self.duration_minutes)) * MS_PER_MINUTE
    }
}

type SharedAuditSink = Arc<Mutex<Box<dyn AuditSink>>>;

/// Allocation, release and reclamation over pluggable stores.
pub struct CapacityEngine {
    registry: PoolRegistry,
    leases: Arc<dyn LeaseStore>,
    accounts: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
    bounds: StoreBounds,
    reclaim_policy: ReclaimPolicy,
    audit: Option<SharedAuditSink>,
}

impl CapacityEngine {
    /// Create an engine using the system clock and the default reclaim policy.
    #[must_use]
    pub fn new(
        registry: PoolRegistry,
        leases: Arc<dyn LeaseStore>,
        accounts: Arc<dyn AccountStore>,
        bounds: StoreBounds,
    ) -> Self {
        Self {
            registry,
            leases,
            accounts,
            clock: Arc::new(SystemClock),
            bounds,
            reclaim_policy: ReclaimPolicy::default(),
            audit: None,
        }
    }

    /// Replace the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Choose how expired leases return capacity.
    #[must_use]
    pub const fn with_reclaim_policy(mut self, policy: ReclaimPolicy) -> Self {
        self.reclaim_policy = policy;
        self
    }

    /// Mirror lease state changes into `sink`.
    #[must_use]
    pub fn with_audit(mut self, sink: impl AuditSink + 'static) -> Self {
        let sink: Box<dyn AuditSink> = Box::new(sink);
        self.audit = Some(Arc::new(Mutex::new(sink)));
        self
    }

    /// Pool registry backing this engine.
    #[must_use]
    pub const fn registry(&self) -> &PoolRegistry {
        &self.registry
    }

    /// Active reclaim policy.
    #[must_use]
    pub const fn reclaim_policy(&self) -> ReclaimPolicy {
        self.reclaim_policy
    }

    /// Current time according to the engine clock.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Reserve capacity and record a new lease.
    ///
    /// Pools are tried in search order for `ctx.region`; the first with enough
    /// headroom backs the lease. If the lease cannot be written the
    /// reservation is undone.
    ///
    /// # Errors
    ///
    /// Validation, unknown resource, exhaustion and store errors.
    pub async fn allocate(
        &self,
        ctx: &RequestContext,
        request: AllocationRequest,
    ) -> EngineResult<Lease> {
        ctx.validate()?;
        request.validate()?;
        self.registry.region_scope(&ctx.region)?;

        if let Some(existing) = self.find_retry(ctx, &request).await? {
            debug!(lease_id = %existing.id, requester = %ctx.requester_id, "returning lease for repeated request id");
            return Ok(existing);
        }

        let amount_tb = Capacity::new(request.magnitude, request.unit).to_canonical();
        let candidates = self.registry.lookup(&request.resource, &ctx.region).await?;

        let mut backing = None;
        for key in candidates {
            if let Some(pool) = self.registry.reserve(&key, amount_tb).await? {
                backing = Some(pool);
                break;
            }
            debug!(pool = %key, amount_tb, "pool lacks headroom, trying next");
        }
        let Some(pool) = backing else {
            warn!(
                resource = %request.resource,
                region = %ctx.region,
                amount_tb,
                "no pool can satisfy allocation"
            );
            return Err(EngineError::ResourceExhausted {
                resource: request.resource,
                requested_tb: amount_tb,
            });
        };

        let now = self.now_ms();
        let lease = Lease {
            id: LeaseId::new(),
            request_id: request.request_id.clone(),
            requester_id: ctx.requester_id.clone(),
            requester_region: ctx.region.clone(),
            resource: request.resource.clone(),
            magnitude: request.magnitude,
            unit: request.unit,
            amount_tb,
            backing_pool: pool.key.clone(),
            duration_hours: request.duration_hours,
            duration_minutes: request.duration_minutes,
            created_at_ms: now,
            release_at_ms: now.saturating_add(request.duration_ms()),
            closed_at_ms: None,
            status: LeaseStatus::Allocated,
            release_pending: false,
            version: 0,
        };

        match self.write_lease(lease.clone(), None).await {
            Ok(Some(stored)) => {
                info!(
                    lease_id = %stored.id,
                    pool = %stored.backing_pool,
                    requester = %stored.requester_id,
                    amount_tb,
                    "capacity allocated"
                );
                self.record_audit(&stored, AuditAction::Allocate, None);
                Ok(stored)
            }
            Ok(None) => {
                self.roll_back(&lease).await?;
                // A concurrent retry with the same request id won the insert.
                match self.find_retry(ctx, &request).await? {
                    Some(existing) => Ok(existing),
                    None => Err(StoreError::Conflict(format!("lease {} already exists", lease.id)).into()),
                }
            }
            Err(err) => {
                self.roll_back(&lease).await?;
                Err(err)
            }
        }
    }

    /// The lease an earlier call with the same request id produced. A retry
    /// that asks for something different is rejected.
    async fn find_retry(
        &self,
        ctx: &RequestContext,
        request: &AllocationRequest,
    ) -> EngineResult<Option<Lease>> {
        let Some(request_id) = request.request_id.as_deref() else {
            return Ok(None);
        };
        let existing = self
            .bounds
            .call(
                "lease.find_by_request_id",
                self.leases.find_by_request_id(&ctx.requester_id, request_id),
            )
            .await?;
        match existing {
            Some(lease)
                if lease.resource != request.resource
                    || lease.magnitude.to_bits() != request.magnitude.to_bits()
                    || lease.unit != request.unit =>
            {
                Err(EngineError::Validation(format!(
                    "request id `{request_id}` was already used for {} {} of `{}`",
                    lease.magnitude, lease.unit, lease.resource
                )))
            }
            other => Ok(other),
        }
    }

    /// Undo the reservation made for `lease` after its write failed.
    async fn roll_back(&self, lease: &Lease) -> EngineResult<()> {
        match self.registry.unreserve(&lease.backing_pool, lease.amount_tb).await {
            Ok(_) => {
                warn!(lease_id = %lease.id, pool = %lease.backing_pool, "lease write failed, reservation rolled back");
                self.record_audit(lease, AuditAction::Rollback, None);
                Ok(())
            }
            Err(err) => {
                error!(
                    lease_id = %lease.id,
                    pool = %lease.backing_pool,
                    amount_tb = lease.amount_tb,
                    error = %err,
                    "rollback of reservation failed"
                );
                Err(StoreError::Backend(format!(
                    "rollback of {} TB on {} failed: {err}",
                    lease.amount_tb, lease.backing_pool
                ))
                .into())
            }
        }
    }

    /// Fetch a lease by id.
    ///
    /// # Errors
    ///
    /// Store failures and timeouts.
    pub async fn lease(&self, id: LeaseId) -> EngineResult<Option<Lease>> {
        Ok(self.bounds.call("lease.get", self.leases.get(id)).await?)
    }

    /// Every lease of a requester, oldest first.
    ///
    /// # Errors
    ///
    /// Store failures and timeouts.
    pub async fn leases_for(&self, requester_id: &str) -> EngineResult<Vec<Lease>> {
        let mut leases = self
            .bounds
            .call("lease.list_by_requester", self.leases.list_by_requester(requester_id))
            .await?;
        leases.sort_by_key(|l| (l.created_at_ms, l.id));
        Ok(leases)
    }

    /// Conditionally write a lease over `previous` (`None` inserts).
    /// Returns the stored copy with its new version, or `None` if `previous`
    /// is no longer current.
    ///
    /// Moves the lifecycle forbids are rejected before touching the store.
    async fn write_lease(&self, lease: Lease, previous: Option<&Lease>) -> EngineResult<Option<Lease>> {
        if let Some(prev) = previous {
            if !prev.status.can_transition_to(lease.status) {
                return Err(EngineError::InvalidState(format!(
                    "lease {} cannot move from {} to {}",
                    lease.id, prev.status, lease.status
                )));
            }
        }
        let expected = previous.map(|p| p.version);
        let written = self
            .bounds
            .call("lease.compare_and_swap", self.leases.compare_and_swap(lease.clone(), expected))
            .await?;
        Ok(written.then(|| Lease {
            version: next_version(expected),
            ..lease
        }))
    }

    fn record_audit(&self, lease: &Lease, action: AuditAction, payload: Option<String>) {
        if let Some(sink) = &self.audit {
            let event = build_audit_event(
                lease.id,
                &lease.backing_pool,
                lease.requester_id.clone(),
                action,
                lease.amount_tb,
                self.now_ms(),
                payload,
            );
            sink.lock().record(event);
        }
    }
}
