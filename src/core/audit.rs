//! Audit sink implementations.
//!
//! Every lease state change the engine performs can be mirrored into an
//! [`AuditSink`]. The in-memory sink keeps a bounded ring for tests and
//! local inspection.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::lease::LeaseId;
use crate::core::pool::PoolKey;

/// What happened to a lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Capacity reserved and lease written.
    Allocate,
    /// Capacity returned by the requester.
    Release,
    /// A release could not return capacity.
    ReleaseFailed,
    /// Expired lease removed by the reclaimer.
    Reclaim,
    /// Reservation undone after a failed lease write.
    Rollback,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Allocate => "allocate",
            Self::Release => "release",
            Self::ReleaseFailed => "release_failed",
            Self::Reclaim => "reclaim",
            Self::Rollback => "rollback",
        };
        f.write_str(s)
    }
}

/// Audit event structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Lease the event concerns.
    pub lease_id: LeaseId,
    /// Pool the capacity moved against.
    pub pool: PoolKey,
    /// Requester identity.
    pub requester: String,
    /// Action taken.
    pub action: AuditAction,
    /// Amount moved, in TB.
    pub amount_tb: f64,
    /// Timestamp milliseconds.
    pub created_at_ms: u64,
    /// Additional context.
    pub payload: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// In-memory audit sink for testing and dev.
pub struct InMemoryAuditSink {
    events: VecDeque<AuditEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.max_events == 0 {
            return;
        }
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Forwards events to a shared in-memory sink, so a test or collaborator can
/// keep a handle to the buffer the engine writes into.
impl AuditSink for std::sync::Arc<parking_lot::Mutex<InMemoryAuditSink>> {
    fn record(&mut self, event: AuditEvent) {
        self.lock().record(event);
    }
}

/// Helper to build an audit event from context.
#[must_use]
pub fn build_audit_event(
    lease_id: LeaseId,
    pool: &PoolKey,
    requester: impl Into<String>,
    action: AuditAction,
    amount_tb: f64,
    now_ms: u64,
    payload: Option<String>,
) -> AuditEvent {
    AuditEvent {
        event_id: Uuid::new_v4().to_string(),
        lease_id,
        pool: pool.clone(),
        requester: requester.into(),
        action,
        amount_tb,
        created_at_ms: now_ms,
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(action: AuditAction) -> AuditEvent {
        build_audit_event(
            LeaseId::new(),
            &PoolKey::global("disk"),
            "alice",
            action,
            1.0,
            42,
            None,
        )
    }

    #[test]
    fn test_ring_buffer_drops_oldest() {
        let mut sink = InMemoryAuditSink::new(2);
        sink.record(event(AuditAction::Allocate));
        sink.record(event(AuditAction::Release));
        sink.record(event(AuditAction::Reclaim));
        let actions: Vec<_> = sink.events().into_iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![AuditAction::Release, AuditAction::Reclaim]);
    }

    #[test]
    fn test_action_names() {
        assert_eq!(AuditAction::ReleaseFailed.to_string(), "release_failed");
        let json = serde_json::to_string(&AuditAction::Rollback).unwrap();
        assert_eq!(json, "\"rollback\"");
    }
}
