//! Storage backends for pools, leases, and accounts.
//!
//! Each table has an in-memory backend and a JSON-lines file backend.

pub mod accounts;
pub mod jsonl;
pub mod leases;
pub mod pools;

pub use accounts::{FileAccountStore, InMemoryAccountStore};
pub use jsonl::JsonlTable;
pub use leases::{FileLeaseStore, InMemoryLeaseStore};
pub use pools::{FilePoolStore, InMemoryPoolStore};
