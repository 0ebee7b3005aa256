//! Integration tests for the collaborator-facing API surface.

mod common;

use capacity_lease::core::{EngineError, LeaseSelector, PoolKey, SizeUnit};
use capacity_lease::runtime::{
    lease_countdowns, pool_snapshots, submit_allocation, AllocationSubmission, Reminder,
    ReminderState,
};
use common::{ctx, fixture, EU, MINUTE_MS, T0, US};

fn submission(unit: &str, size: f64, minutes: u8) -> AllocationSubmission {
    AllocationSubmission {
        requester_id: "alice".into(),
        region: US.into(),
        resource: "disk".into(),
        size,
        unit: unit.into(),
        hours: 0,
        minutes,
        request_id: None,
    }
}

#[tokio::test]
async fn test_submission_parses_unit_case_insensitively() {
    let fx = fixture();
    fx.provision(&PoolKey::region(US, "disk"), 1.0).await;

    let lease = submit_allocation(&fx.engine, submission("gb", 256.0, 30))
        .await
        .unwrap();
    assert_eq!(lease.unit, SizeUnit::Gb);
    assert_eq!(lease.amount_tb, 0.25);

    let err = submit_allocation(&fx.engine, submission("bytes", 1.0, 30))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnitConversion(_)));
}

#[tokio::test]
async fn test_pool_snapshots_sorted_with_headroom() {
    let fx = fixture();
    fx.provision(&PoolKey::region(US, "disk"), 2.0).await;
    fx.provision(&PoolKey::region(EU, "disk"), 1.0).await;
    fx.provision(&PoolKey::global("disk"), 8.0).await;
    submit_allocation(&fx.engine, submission("TB", 0.5, 10))
        .await
        .unwrap();

    let rows = pool_snapshots(&fx.engine).await.unwrap();
    let scopes: Vec<_> = rows.iter().map(|r| r.scope.as_str()).collect();
    assert_eq!(scopes, vec!["global", "eu-west", "us-east"]);
    let us = &rows[2];
    assert_eq!(us.allocated_tb, 0.5);
    assert_eq!(us.headroom_tb, 1.5);
    assert_eq!(us.unit, SizeUnit::Tb);
}

#[tokio::test]
async fn test_countdowns_and_reminders() {
    let fx = fixture();
    fx.provision(&PoolKey::region(US, "disk"), 10.0).await;
    let soon = submit_allocation(&fx.engine, submission("TB", 1.0, 12))
        .await
        .unwrap();
    let later = submit_allocation(&fx.engine, submission("TB", 1.0, 45))
        .await
        .unwrap();
    let gone = submit_allocation(&fx.engine, submission("TB", 1.0, 50))
        .await
        .unwrap();
    fx.engine
        .release(&ctx("alice", US), LeaseSelector::Id(gone.id))
        .await
        .unwrap();

    let now = T0 + 2 * MINUTE_MS;
    let rows = lease_countdowns(&fx.engine, "alice", now).await.unwrap();
    let ids: Vec<_> = rows.iter().map(|r| r.lease_id).collect();
    assert_eq!(ids, vec![soon.id, later.id]);
    assert_eq!(rows[0].minutes_left(), 10);
    assert!(!rows[0].overdue);

    let mut state = ReminderState::new();
    assert_eq!(state.poll_countdown(&rows[0], now), Some(Reminder::TenMinutes));
    assert_eq!(state.poll_countdown(&rows[0], now + MINUTE_MS), None);

    let overdue = lease_countdowns(&fx.engine, "alice", T0 + 13 * MINUTE_MS)
        .await
        .unwrap();
    assert!(overdue[0].overdue);
    assert_eq!(overdue[0].remaining_ms, 0);
}
