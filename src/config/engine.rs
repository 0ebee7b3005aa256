//! Engine configuration structures.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::{validate_region_id, AppResult, Capacity, ReclaimPolicy, StoreBounds};

/// Environment variable naming the JSON config file.
pub const CONFIG_ENV_VAR: &str = "CAPACITY_LEASE_CONFIG";

/// Store backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StoreBackendConfig {
    /// In-memory stores; state is lost on exit.
    #[default]
    InMemory,
    /// JSON-lines files under `dir`.
    File {
        /// Directory holding the table files.
        dir: PathBuf,
    },
}

/// Store access settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend selection.
    #[serde(default)]
    pub backend: StoreBackendConfig,
    /// Upper bound for a single store call, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackendConfig::default(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Expiry reclaimer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimerConfig {
    /// Seconds between sweeps.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Seconds an in-flight sweep may take to finish on shutdown.
    #[serde(default = "default_grace_secs")]
    pub shutdown_grace_secs: u64,
    /// How expired leases give their capacity back.
    #[serde(default)]
    pub policy: ReclaimPolicy,
}

impl Default for ReclaimerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            shutdown_grace_secs: default_grace_secs(),
            policy: ReclaimPolicy::default(),
        }
    }
}

/// Tuning for engine-internal loops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineTuning {
    /// Compare-and-swap attempts before a write gives up with a conflict.
    #[serde(default = "default_max_cas_retries")]
    pub max_cas_retries: u32,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            max_cas_retries: default_max_cas_retries(),
        }
    }
}

const fn default_timeout_ms() -> u64 {
    2_000
}

const fn default_interval_secs() -> u64 {
    60
}

const fn default_grace_secs() -> u64 {
    5
}

const fn default_max_cas_retries() -> u32 {
    16
}

/// Root engine configuration.
///
/// `regions` maps each region id to the pools seeded there (resource name to
/// capacity); `global` seeds the shared pools. A region with no seeded pools
/// is still a valid requester region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Region id to resource name to capacity.
    pub regions: BTreeMap<String, BTreeMap<String, Capacity>>,
    /// Resource name to capacity of the global pools.
    #[serde(default)]
    pub global: BTreeMap<String, Capacity>,
    /// Expiry reclaimer settings.
    #[serde(default)]
    pub reclaimer: ReclaimerConfig,
    /// Store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Engine tuning.
    #[serde(default)]
    pub engine: EngineTuning,
}

fn validate_seeds(scope: &str, seeds: &BTreeMap<String, Capacity>) -> Result<(), String> {
    for (resource, capacity) in seeds {
        if resource.trim().is_empty() {
            return Err(format!("{scope}: resource name must not be empty"));
        }
        if !(capacity.magnitude.is_finite() && capacity.magnitude > 0.0) {
            return Err(format!(
                "{scope}/{resource}: capacity must be greater than 0, got {capacity}"
            ));
        }
    }
    Ok(())
}

impl EngineConfig {
    /// Validate all settings and seeded pools.
    pub fn validate(&self) -> Result<(), String> {
        if self.regions.is_empty() {
            return Err("at least one region must be defined".into());
        }
        for (region, seeds) in &self.regions {
            validate_region_id(region).map_err(|e| e.to_string())?;
            validate_seeds(region, seeds)?;
        }
        validate_seeds("global", &self.global)?;
        if self.reclaimer.interval_secs == 0 {
            return Err("reclaimer.interval_secs must be greater than 0".into());
        }
        if self.store.timeout_ms == 0 {
            return Err("store.timeout_ms must be greater than 0".into());
        }
        if self.engine.max_cas_retries == 0 {
            return Err("engine.max_cas_retries must be greater than 0".into());
        }
        if let StoreBackendConfig::File { dir } = &self.store.backend {
            if dir.as_os_str().is_empty() {
                return Err("store.backend.dir must not be empty".into());
            }
        }
        Ok(())
    }

    /// Parse engine configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON config file.
    ///
    /// # Errors
    ///
    /// I/O, parse and validation failures, with the path as context.
    pub fn from_path(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json_str(&raw)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("invalid config {}", path.display()))
    }

    /// Load `.env` if present, then read the file named by
    /// [`CONFIG_ENV_VAR`].
    ///
    /// # Errors
    ///
    /// Fails when the variable is unset or the file is unusable.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        let path = std::env::var(CONFIG_ENV_VAR)
            .with_context(|| format!("{CONFIG_ENV_VAR} is not set"))?;
        Self::from_path(path)
    }

    /// Region ids in lexicographic order.
    pub fn region_ids(&self) -> impl Iterator<Item = &str> {
        self.regions.keys().map(String::as_str)
    }

    /// Store call bounds derived from this config.
    #[must_use]
    pub const fn bounds(&self) -> StoreBounds {
        StoreBounds {
            timeout: Duration::from_millis(self.store.timeout_ms),
            max_cas_retries: self.engine.max_cas_retries,
        }
    }

    /// Interval between reclaimer sweeps.
    #[must_use]
    pub const fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaimer.interval_secs)
    }

    /// Grace period for an in-flight sweep on shutdown.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.reclaimer.shutdown_grace_secs)
    }
}
