//! Configuration models for regions, pools, stores, and the reclaimer.

pub mod engine;

pub use engine::{
    EngineConfig, EngineTuning, ReclaimerConfig, StoreBackendConfig, StoreConfig, CONFIG_ENV_VAR,
};
