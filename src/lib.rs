//! # Capacity Lease
//!
//! A regional capacity lease engine: time-bounded grants of storage capacity
//! carved out of per-region and global resource pools.
//!
//! Requesters ask for an amount of a named resource (in KB, MB, GB or TB) for
//! a duration. The engine finds the first pool with enough headroom, searching
//! the requester's region, then the global pool, then every other region, and
//! records a lease against it. Leases are returned explicitly or reclaimed by
//! a background sweep once their release time has passed.
//!
//! ## Key Features
//!
//! - **Exact Unit Handling**: power-of-1024 conversion into a canonical TB unit
//! - **Optimistic Concurrency**: every pool and lease write is a version CAS,
//!   so concurrent allocators, releasers and the reclaimer never overshoot
//!   capacity or return it twice
//! - **Recorded Backing Pool**: release returns capacity to exactly the pool
//!   the lease was taken from
//! - **Pluggable Stores**: in-memory or JSON-lines file backends behind async
//!   traits, every call bounded by a timeout
//! - **Background Reclaimer**: tokio task with graceful and forced shutdown
//!
//! ## Usage
//!
//! ```rust,ignore
//! use capacity_lease::builders::build_engine;
//! use capacity_lease::config::EngineConfig;
//! use capacity_lease::core::{AllocationRequest, LeaseSelector, RequestContext, SizeUnit};
//!
//! let cfg = EngineConfig::from_env()?;
//! let engine = build_engine(&cfg).await?;
//!
//! let ctx = RequestContext::new("alice", "us-east");
//! let lease = engine
//!     .allocate(&ctx, AllocationRequest::new("disk", 512.0, SizeUnit::Gb, 2, 30))
//!     .await?;
//! engine.release(&ctx, LeaseSelector::Id(lease.id)).await?;
//! ```
//!
//! For complete examples, see the integration tests under `tests/`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core lease abstractions and capacity accounting.
pub mod core;
/// Configuration models for regions, pools, stores, and the reclaimer.
pub mod config;
/// Builders to construct engine components from configuration.
pub mod builders;
/// Storage backends for pools, leases, and accounts.
pub mod infra;
/// Runtime adapters, the background reclaimer, and the API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
