//! Account store backends.

pub mod file;
pub mod memory;

pub use file::FileAccountStore;
pub use memory::InMemoryAccountStore;
