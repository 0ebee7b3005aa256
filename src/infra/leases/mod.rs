//! Lease store backends.

use std::collections::HashMap;

use crate::core::{next_version, Lease, LeaseId};

pub mod file;
pub mod memory;

pub use file::FileLeaseStore;
pub use memory::InMemoryLeaseStore;

/// Conditional write shared by the lease backends. Returns the replaced lease
/// on success (`Some(None)` for a fresh insert).
fn apply_cas(
    leases: &mut HashMap<LeaseId, Lease>,
    mut lease: Lease,
    expected_version: Option<u64>,
) -> Option<Option<Lease>> {
    let current = leases.get(&lease.id).map(|l| l.version);
    if current != expected_version {
        return None;
    }
    if expected_version.is_none() {
        if let Some(request_id) = &lease.request_id {
            if find_by_request_id(leases, &lease.requester_id, request_id).is_some() {
                return None;
            }
        }
    }
    lease.version = next_version(expected_version);
    Some(leases.insert(lease.id, lease))
}

fn find_by_request_id<'a>(
    leases: &'a HashMap<LeaseId, Lease>,
    requester_id: &str,
    request_id: &str,
) -> Option<&'a Lease> {
    leases
        .values()
        .find(|l| l.requester_id == requester_id && l.request_id.as_deref() == Some(request_id))
}

fn by_requester(leases: &HashMap<LeaseId, Lease>, requester_id: &str) -> Vec<Lease> {
    leases
        .values()
        .filter(|l| l.requester_id == requester_id)
        .cloned()
        .collect()
}

fn expired(leases: &HashMap<LeaseId, Lease>, now_ms: u64) -> Vec<Lease> {
    let mut due: Vec<Lease> = leases
        .values()
        .filter(|l| l.status == crate::core::LeaseStatus::Allocated && l.is_due(now_ms))
        .cloned()
        .collect();
    due.sort_by_key(|l| (l.release_at_ms, l.id));
    due
}
