//! Key-value store gateway trait.

use crate::error::Result;
use async_trait::async_trait;

/// A single entry read from the store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KvPair {
    /// Full key path
    pub key: String,
    /// Raw stored bytes
    pub value: Vec<u8>,
    /// Opaque user flags attached to the entry
    pub flags: u64,
    /// Store index at which the key was created
    pub create_index: u64,
    /// Store index of the last write to the key
    pub modify_index: u64,
}

/// Gateway to a remote key-value store.
///
/// Implement this trait to plug another store (or a test double) into
/// [`KvClient`](crate::core::KvClient) and [`PrefixWatcher`](crate::notify::PrefixWatcher).
/// Implementations must be safe to share across watch tasks; each call is independent.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Point lookup of a single key.
    ///
    /// Returns `Ok(None)` when the key does not exist, so callers can tell a
    /// missing key apart from a failure to reach the store.
    ///
    /// # Errors
    ///
    /// Returns a transport-class error if the store cannot be reached or its
    /// response cannot be parsed.
    async fn get(&self, key: &str) -> Result<Option<KvPair>>;

    /// Blocking list of everything under `prefix`.
    ///
    /// The store holds the request open until something under `prefix` changes
    /// past `since_index` or its wait time elapses, then returns its current
    /// index for the prefix. The returned index may equal `since_index` when the
    /// wait timed out with no change.
    ///
    /// # Errors
    ///
    /// Returns a transport-class error on failure. Callers retry with the same
    /// `since_index`.
    async fn watch_prefix(&self, prefix: &str, since_index: u64) -> Result<u64>;

    /// Get a human-readable name for this store (for logging/debugging).
    fn name(&self) -> String;
}
