//! Periodic expiry reclaimer task.
//!
//! The task sweeps on a fixed interval until told to stop. Shutdown lets an
//! in-flight sweep finish within a grace period and aborts the task after
//! that.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::core::CapacityEngine;
use crate::runtime::tokio_spawner::TokioSpawner;

/// How the reclaimer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The loop exited on its own within the grace period.
    Graceful,
    /// The grace period elapsed and the task was aborted.
    Forced,
}

/// Reclaimer settings bound to an engine, ready to start.
pub struct ReclaimerTask {
    engine: Arc<CapacityEngine>,
    interval: Duration,
    grace: Duration,
}

impl ReclaimerTask {
    /// Sweep `engine` every `interval`; allow `grace` for shutdown.
    #[must_use]
    pub const fn new(engine: Arc<CapacityEngine>, interval: Duration, grace: Duration) -> Self {
        Self {
            engine,
            interval,
            grace,
        }
    }

    /// Take interval and grace from configuration.
    #[must_use]
    pub fn from_config(engine: Arc<CapacityEngine>, cfg: &EngineConfig) -> Self {
        Self::new(engine, cfg.reclaim_interval(), cfg.shutdown_grace())
    }

    /// Spawn the sweep loop.
    #[must_use]
    pub fn start(self, spawner: &TokioSpawner) -> ReclaimerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let sweeps = Arc::new(AtomicU64::new(0));
        let join = spawner.spawn(run(self.engine, self.interval, stop_rx, Arc::clone(&sweeps)));
        info!(interval = ?self.interval, "reclaimer started");
        ReclaimerHandle {
            stop: stop_tx,
            join,
            grace: self.grace,
            sweeps,
        }
    }
}

async fn run(
    engine: Arc<CapacityEngine>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
    sweeps: Arc<AtomicU64>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => break,
            _ = ticker.tick() => {
                match engine.reclaim_expired().await {
                    Ok(report) => debug!(?report, "reclaim sweep"),
                    Err(err) => error!(error = %err, "reclaim sweep failed"),
                }
                sweeps.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
    debug!("reclaimer loop exited");
}

/// Handle to a running reclaimer.
pub struct ReclaimerHandle {
    stop: watch::Sender<bool>,
    join: JoinHandle<()>,
    grace: Duration,
    sweeps: Arc<AtomicU64>,
}

impl ReclaimerHandle {
    /// Sweeps completed so far.
    #[must_use]
    pub fn sweeps(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }

    /// Stop scheduling sweeps and wait for the loop to exit, aborting it
    /// once the grace period has elapsed.
    pub async fn shutdown(mut self) -> ShutdownOutcome {
        let _ = self.stop.send(true);
        if tokio::time::timeout(self.grace, &mut self.join).await.is_ok() {
            info!(sweeps = self.sweeps(), "reclaimer stopped");
            ShutdownOutcome::Graceful
        } else {
            self.join.abort();
            warn!(grace = ?self.grace, "reclaimer did not stop in time, aborted");
            ShutdownOutcome::Forced
        }
    }
}
