//! Key-value store gateways.

#[cfg(feature = "consul")]
mod consul;
mod kv_store;
mod memory;

#[cfg(feature = "consul")]
pub use consul::{ConsulStore, ConsulStoreBuilder, DEFAULT_ADDRESS};
pub use kv_store::{KvPair, KvStore};
pub use memory::MemoryStore;
