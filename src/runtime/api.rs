//! API-facing request/response models for collaborators.
//!
//! Form-style submissions, read-only views for status tables and countdowns,
//! and the per-lease reminder record a notification collaborator keeps.
//! Nothing here mutates engine state except [`submit_allocation`].

use serde::{Deserialize, Serialize};

use crate::core::{
    AllocationRequest, CapacityEngine, EngineResult, Lease, LeaseId, LeaseStatus, RequestContext,
    SizeUnit,
};

/// Time before release at which the first reminder fires, in ms.
pub const FIRST_REMINDER_MS: u64 = 10 * 60_000;
/// Time before release at which the second reminder fires, in ms.
pub const SECOND_REMINDER_MS: u64 = 5 * 60_000;
/// Minimum spacing between overdue reminders.
pub const OVERDUE_REPEAT_MS: u64 = 5 * 60_000;

/// Allocation request as submitted by a form, with the unit as free text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationSubmission {
    /// Requester identity.
    pub requester_id: String,
    /// Requester region.
    pub region: String,
    /// Resource name.
    pub resource: String,
    /// Requested size.
    pub size: f64,
    /// Unit name, case-insensitive.
    pub unit: String,
    /// Duration hours.
    pub hours: u8,
    /// Duration minutes.
    pub minutes: u8,
    /// Idempotency key.
    #[serde(default)]
    pub request_id: Option<String>,
}

impl AllocationSubmission {
    /// Split into the engine's context and typed request.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnitConversion`](crate::core::EngineError::UnitConversion)
    /// for an unknown unit name.
    pub fn into_parts(self) -> EngineResult<(RequestContext, AllocationRequest)> {
        let unit: SizeUnit = self.unit.parse()?;
        let ctx = RequestContext::new(self.requester_id, self.region);
        let request = AllocationRequest {
            resource: self.resource,
            magnitude: self.size,
            unit,
            duration_hours: self.hours,
            duration_minutes: self.minutes,
            request_id: self.request_id,
        };
        Ok((ctx, request))
    }
}

/// Parse and allocate a form submission.
///
/// # Errors
///
/// Any error of [`AllocationSubmission::into_parts`] or
/// [`CapacityEngine::allocate`].
pub async fn submit_allocation(
    engine: &CapacityEngine,
    submission: AllocationSubmission,
) -> EngineResult<Lease> {
    let (ctx, request) = submission.into_parts()?;
    engine.allocate(&ctx, request).await
}

/// One row of the pool status table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    /// `global` or the region id.
    pub scope: String,
    /// Resource name.
    pub resource: String,
    /// Declared capacity magnitude.
    pub capacity: f64,
    /// Declared capacity unit.
    pub unit: SizeUnit,
    /// Allocated amount in TB.
    pub allocated_tb: f64,
    /// Free amount in TB.
    pub headroom_tb: f64,
}

/// Status table of every pool, sorted by scope then resource.
///
/// # Errors
///
/// Store failures.
pub async fn pool_snapshots(engine: &CapacityEngine) -> EngineResult<Vec<PoolSnapshot>> {
    Ok(engine
        .registry()
        .snapshot()
        .await?
        .into_iter()
        .map(|p| PoolSnapshot {
            scope: p.key.scope.to_string(),
            headroom_tb: p.headroom_tb(),
            resource: p.key.resource,
            capacity: p.capacity.magnitude,
            unit: p.capacity.unit,
            allocated_tb: p.allocated_tb,
        })
        .collect())
}

/// Time left on one allocated lease.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseCountdown {
    /// Lease id.
    pub lease_id: LeaseId,
    /// Resource name.
    pub resource: String,
    /// Requested magnitude.
    pub magnitude: f64,
    /// Requested unit.
    pub unit: SizeUnit,
    /// Release time (ms since epoch).
    pub release_at_ms: u64,
    /// Milliseconds until release; zero once overdue.
    pub remaining_ms: u64,
    /// Whether the release time has passed.
    pub overdue: bool,
}

impl LeaseCountdown {
    /// Whole minutes remaining, rounded down.
    #[must_use]
    pub const fn minutes_left(&self) -> u64 {
        self.remaining_ms / 60_000
    }
}

/// Countdowns for a requester's `allocated` leases, soonest first.
///
/// # Errors
///
/// Store failures.
pub async fn lease_countdowns(
    engine: &CapacityEngine,
    requester_id: &str,
    now_ms: u64,
) -> EngineResult<Vec<LeaseCountdown>> {
    let mut rows: Vec<LeaseCountdown> = engine
        .leases_for(requester_id)
        .await?
        .into_iter()
        .filter(|l| l.status == LeaseStatus::Allocated)
        .map(|l| LeaseCountdown {
            lease_id: l.id,
            remaining_ms: l.remaining_ms(now_ms),
            overdue: l.is_due(now_ms),
            resource: l.resource,
            magnitude: l.magnitude,
            unit: l.unit,
            release_at_ms: l.release_at_ms,
        })
        .collect();
    rows.sort_by_key(|r| r.release_at_ms);
    Ok(rows)
}

/// A reminder the notification collaborator should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reminder {
    /// Ten minutes or less remain.
    TenMinutes,
    /// Five minutes or less remain.
    FiveMinutes,
    /// The release time has passed.
    Overdue,
}

/// Per-lease reminder bookkeeping.
///
/// Each of the two countdown reminders fires at most once; overdue reminders
/// repeat no more often than [`OVERDUE_REPEAT_MS`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderState {
    ten_minutes_sent: bool,
    five_minutes_sent: bool,
    last_overdue_ms: Option<u64>,
}

impl ReminderState {
    /// Fresh state with nothing sent.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reminder due for a lease releasing at `release_at_ms`, if any, and
    /// record it as sent.
    pub fn poll(&mut self, release_at_ms: u64, now_ms: u64) -> Option<Reminder> {
        if now_ms >= release_at_ms {
            let due = self
                .last_overdue_ms
                .is_none_or(|last| now_ms.saturating_sub(last) >= OVERDUE_REPEAT_MS);
            if due {
                self.last_overdue_ms = Some(now_ms);
                return Some(Reminder::Overdue);
            }
            return None;
        }
        let remaining = release_at_ms - now_ms;
        if remaining <= SECOND_REMINDER_MS {
            if self.five_minutes_sent {
                return None;
            }
            self.five_minutes_sent = true;
            self.ten_minutes_sent = true;
            return Some(Reminder::FiveMinutes);
        }
        if remaining <= FIRST_REMINDER_MS && !self.ten_minutes_sent {
            self.ten_minutes_sent = true;
            return Some(Reminder::TenMinutes);
        }
        None
    }

    /// Convenience over [`Self::poll`] for a countdown row.
    pub fn poll_countdown(&mut self, countdown: &LeaseCountdown, now_ms: u64) -> Option<Reminder> {
        self.poll(countdown.release_at_ms, now_ms)
    }
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
    /// Crate version.
    pub version: String,
}

/// Liveness payload.
#[must_use]
pub fn health() -> Health {
    Health {
        ok: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EngineError;

    const MIN: u64 = 60_000;

    #[test]
    fn test_reminder_cadence() {
        let release = 60 * MIN;
        let mut state = ReminderState::new();
        assert_eq!(state.poll(release, 40 * MIN), None);
        assert_eq!(state.poll(release, 50 * MIN), Some(Reminder::TenMinutes));
        assert_eq!(state.poll(release, 51 * MIN), None);
        assert_eq!(state.poll(release, 55 * MIN), Some(Reminder::FiveMinutes));
        assert_eq!(state.poll(release, 58 * MIN), None);
        assert_eq!(state.poll(release, 60 * MIN), Some(Reminder::Overdue));
        assert_eq!(state.poll(release, 63 * MIN), None);
        assert_eq!(state.poll(release, 65 * MIN), Some(Reminder::Overdue));
    }

    #[test]
    fn test_late_poll_skips_ten_minute_reminder() {
        let mut state = ReminderState::new();
        assert_eq!(state.poll(10 * MIN, 7 * MIN), Some(Reminder::FiveMinutes));
        assert_eq!(state.poll(10 * MIN, 8 * MIN), None);
    }

    #[test]
    fn test_submission_unknown_unit() {
        let submission = AllocationSubmission {
            requester_id: "alice".into(),
            region: "us-east".into(),
            resource: "disk".into(),
            size: 1.0,
            unit: "PB".into(),
            hours: 1,
            minutes: 0,
            request_id: None,
        };
        assert!(matches!(
            submission.into_parts(),
            Err(EngineError::UnitConversion(_))
        ));
    }

    #[test]
    fn test_health() {
        assert!(health().ok);
    }
}
