//! Runtime adapters, the background reclaimer, and the API surface.

pub mod api;
pub mod reclaimer;
pub mod tokio_spawner;

pub use api::{
    health, lease_countdowns, pool_snapshots, submit_allocation, AllocationSubmission, Health,
    LeaseCountdown, PoolSnapshot, Reminder, ReminderState,
};
pub use reclaimer::{ReclaimerHandle, ReclaimerTask, ShutdownOutcome};
pub use tokio_spawner::TokioSpawner;
