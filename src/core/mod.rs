//! Core lease abstractions and capacity accounting.

pub mod account;
pub mod audit;
pub mod engine;
pub mod error;
pub mod lease;
pub mod pool;
pub mod registry;
pub mod store;
pub mod units;

pub use account::{AccountStore, RequestContext, Role, UserAccount};
pub use audit::{build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink};
pub use engine::{AllocationRequest, CapacityEngine, ReclaimPolicy, ReclaimReport};
pub use error::{AppResult, EngineError, EngineResult, StoreError};
pub use lease::{Lease, LeaseId, LeaseSelector, LeaseStatus, LeaseStore};
pub use pool::{PoolKey, PoolRecord, PoolStore, Scope};
pub use registry::{validate_region_id, PoolRegistry, GLOBAL_SCOPE};
pub use store::{next_version, StoreBounds};
pub use units::{convert, convert_named, Capacity, SizeUnit, CANONICAL_UNIT, TOLERANCE_TB};
