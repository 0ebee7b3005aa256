//! Pool store backends.

use std::collections::HashMap;

use crate::core::{next_version, PoolKey, PoolRecord};

pub mod file;
pub mod memory;

pub use file::FilePoolStore;
pub use memory::InMemoryPoolStore;

/// Conditional insert shared by the pool backends. Returns the record that
/// was replaced on success (`Some(None)` for a fresh insert).
fn apply_cas(
    pools: &mut HashMap<PoolKey, PoolRecord>,
    mut record: PoolRecord,
    expected_version: Option<u64>,
) -> Option<Option<PoolRecord>> {
    let current = pools.get(&record.key).map(|p| p.version);
    if current != expected_version {
        return None;
    }
    record.version = next_version(expected_version);
    Some(pools.insert(record.key.clone(), record))
}

/// Conditional removal shared by the pool backends.
fn apply_remove(
    pools: &mut HashMap<PoolKey, PoolRecord>,
    key: &PoolKey,
    expected_version: u64,
) -> Option<PoolRecord> {
    match pools.get(key) {
        Some(p) if p.version == expected_version => pools.remove(key),
        _ => None,
    }
}
