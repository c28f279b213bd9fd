//! Adapters implementing the domain ports.

pub mod banking;
pub mod cache;
pub mod encryption;
pub mod events;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod simulated;
