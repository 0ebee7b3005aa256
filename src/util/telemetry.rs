//! Telemetry helpers for structured logging and tracing.

/// Initialize tracing/telemetry. Users can install their own subscriber; this
/// helper installs a default env-based subscriber (`RUST_LOG`) if none is set.
///
/// The engine emits `info` events for every lease state change and `warn`
/// events for exhaustion and failed releases, so `RUST_LOG=capacity_lease=info`
/// gives a readable allocation log.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(true)
        .try_init();
}
