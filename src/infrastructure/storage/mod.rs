//! Byte store adapters.

mod disk_store;
mod memory_store;

pub use disk_store::DiskStore;
pub use memory_store::MemoryStore;
