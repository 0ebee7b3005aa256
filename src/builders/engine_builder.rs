//! Builders to construct a capacity engine from configuration.

use std::sync::Arc;

use tracing::info;

use crate::config::{EngineConfig, StoreBackendConfig};
use crate::core::{
    AccountStore, CapacityEngine, EngineError, EngineResult, LeaseStore, PoolKey, PoolRegistry,
    PoolStore, Scope, StoreError,
};
use crate::infra::{
    FileAccountStore, FileLeaseStore, FilePoolStore, InMemoryAccountStore, InMemoryLeaseStore,
    InMemoryPoolStore,
};

/// The three stores an engine runs on.
#[derive(Clone)]
pub struct EngineStores {
    /// Pool records.
    pub pools: Arc<dyn PoolStore>,
    /// Lease records.
    pub leases: Arc<dyn LeaseStore>,
    /// Requester accounts.
    pub accounts: Arc<dyn AccountStore>,
}

impl EngineStores {
    /// Fresh in-memory stores.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            pools: Arc::new(InMemoryPoolStore::new()),
            leases: Arc::new(InMemoryLeaseStore::new()),
            accounts: Arc::new(InMemoryAccountStore::new()),
        }
    }

    /// Open the stores selected by `backend`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] if a file store cannot be opened.
    pub fn open(backend: &StoreBackendConfig) -> Result<Self, StoreError> {
        match backend {
            StoreBackendConfig::InMemory => Ok(Self::in_memory()),
            StoreBackendConfig::File { dir } => Ok(Self {
                pools: Arc::new(FilePoolStore::open(dir)?),
                leases: Arc::new(FileLeaseStore::open(dir)?),
                accounts: Arc::new(FileAccountStore::open(dir)?),
            }),
        }
    }
}

/// Validate `cfg`, open its stores, seed missing pools and build the engine.
///
/// # Errors
///
/// [`EngineError::Validation`] for invalid configuration; store errors.
pub async fn build_engine(cfg: &EngineConfig) -> EngineResult<CapacityEngine> {
    cfg.validate()
        .map_err(|e| EngineError::Validation(format!("config invalid: {e}")))?;
    let stores = EngineStores::open(&cfg.store.backend)?;
    build_engine_with_stores(cfg, stores).await
}

/// Build an engine over caller-supplied stores.
///
/// # Errors
///
/// [`EngineError::Validation`] for invalid configuration; store errors.
pub async fn build_engine_with_stores(
    cfg: &EngineConfig,
    stores: EngineStores,
) -> EngineResult<CapacityEngine> {
    cfg.validate()
        .map_err(|e| EngineError::Validation(format!("config invalid: {e}")))?;
    let registry = PoolRegistry::new(stores.pools, cfg.region_ids(), cfg.bounds())?;
    let created = seed_pools(&registry, cfg).await?;
    info!(
        regions = registry.regions().len(),
        seeded = created,
        policy = %cfg.reclaimer.policy,
        "capacity engine ready"
    );
    Ok(
        CapacityEngine::new(registry, stores.leases, stores.accounts, cfg.bounds())
            .with_reclaim_policy(cfg.reclaimer.policy),
    )
}

/// Create every configured pool that does not exist yet. Existing pools keep
/// their stored capacity and allocation. Returns the number created.
///
/// # Errors
///
/// Validation and store errors.
pub async fn seed_pools(registry: &PoolRegistry, cfg: &EngineConfig) -> EngineResult<usize> {
    let global = cfg
        .global
        .iter()
        .map(|(resource, capacity)| (Scope::Global, resource, capacity));
    let regional = cfg.regions.iter().flat_map(|(region, seeds)| {
        seeds
            .iter()
            .map(move |(resource, capacity)| (Scope::Region(region.clone()), resource, capacity))
    });

    let mut created = 0;
    for (scope, resource, capacity) in global.chain(regional) {
        let key = PoolKey::new(scope, resource.as_str());
        if registry.seed(&key, *capacity).await? {
            created += 1;
        }
    }
    Ok(created)
}
