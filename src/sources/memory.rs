//! In-process key-value store with blocking-query semantics.

use super::{KvPair, KvStore};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Default)]
struct MemoryState {
    entries: BTreeMap<String, KvPair>,
    /// Index at which a deleted key disappeared, so deletes advance prefix indices.
    tombstones: BTreeMap<String, u64>,
    index: u64,
}

impl MemoryState {
    fn prefix_index(&self, prefix: &str) -> u64 {
        let live = self
            .entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(_, pair)| pair.modify_index);
        let deleted = self
            .tombstones
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(_, index)| *index);
        live.chain(deleted).max().unwrap_or(0)
    }
}

/// A [`KvStore`] kept in memory.
///
/// Every write bumps a store-wide index. [`watch_prefix`](KvStore::watch_prefix)
/// blocks until a key under the prefix is written or deleted past the caller's
/// index, or until the wait time elapses, mirroring a Consul blocking query.
/// Useful for tests and for running an application without a Consul agent.
///
/// # Examples
///
/// ```rust
/// use consul_kv_config::sources::{KvStore, MemoryStore};
///
/// # async fn example() -> consul_kv_config::error::Result<()> {
/// let store = MemoryStore::new();
/// store.put("dev/test", "123");
///
/// let pair = store.get("dev/test").await?.unwrap();
/// assert_eq!(pair.value, b"123");
/// # Ok(())
/// # }
/// ```
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    changes: watch::Sender<u64>,
    wait_time: Duration,
}

impl MemoryStore {
    /// Create an empty store with a 60 second blocking wait.
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            state: Mutex::new(MemoryState::default()),
            changes,
            wait_time: Duration::from_secs(60),
        }
    }

    /// Set how long a blocking query waits for a change before returning.
    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = wait_time;
        self
    }

    /// Write a key and return the new store index.
    pub fn put(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> u64 {
        let key = key.into();
        let index = {
            let mut state = self.state.lock();
            state.index += 1;
            let index = state.index;
            state.tombstones.remove(&key);
            let create_index = state
                .entries
                .get(&key)
                .map(|existing| existing.create_index)
                .unwrap_or(index);
            state.entries.insert(
                key.clone(),
                KvPair {
                    key,
                    value: value.into(),
                    flags: 0,
                    create_index,
                    modify_index: index,
                },
            );
            index
        };
        self.changes.send_replace(index);
        index
    }

    /// Delete a key. Returns `false` if it did not exist.
    pub fn delete(&self, key: &str) -> bool {
        let index = {
            let mut state = self.state.lock();
            if state.entries.remove(key).is_none() {
                return false;
            }
            state.index += 1;
            let index = state.index;
            state.tombstones.insert(key.to_string(), index);
            index
        };
        self.changes.send_replace(index);
        true
    }

    /// The store-wide index of the last write.
    pub fn index(&self) -> u64 {
        self.state.lock().index
    }

    /// The index a blocking query on `prefix` would currently report.
    pub fn prefix_index(&self, prefix: &str) -> u64 {
        self.state.lock().prefix_index(prefix)
    }

    /// Keys currently stored under `prefix`, in order.
    pub fn keys(&self, prefix: &str) -> Vec<String> {
        let state = self.state.lock();
        state
            .entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<KvPair>> {
        Ok(self.state.lock().entries.get(key).cloned())
    }

    async fn watch_prefix(&self, prefix: &str, since_index: u64) -> Result<u64> {
        // Subscribe before reading so a write in between still wakes us.
        let mut changes = self.changes.subscribe();
        let deadline = tokio::time::sleep(self.wait_time);
        tokio::pin!(deadline);

        loop {
            let current = self.prefix_index(prefix);
            if current > since_index {
                return Ok(current);
            }

            tokio::select! {
                _ = &mut deadline => return Ok(self.prefix_index(prefix)),
                changed = changes.changed() => {
                    if changed.is_err() {
                        return Ok(self.prefix_index(prefix));
                    }
                }
            }
        }
    }

    fn name(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryStore::new();
        assert_eq!(store.put("dev/test", "123"), 1);

        let pair = store.get("dev/test").await.unwrap().unwrap();
        assert_eq!(pair.value, b"123");
        assert_eq!(pair.modify_index, 1);
        assert!(store.get("missing/key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_keeps_create_index() {
        let store = MemoryStore::new();
        store.put("dev/a", "1");
        store.put("dev/a", "2");

        let pair = store.get("dev/a").await.unwrap().unwrap();
        assert_eq!(pair.create_index, 1);
        assert_eq!(pair.modify_index, 2);
    }

    #[test]
    fn test_prefix_index_is_scoped() {
        let store = MemoryStore::new();
        store.put("dev/a", "1");
        store.put("prod/a", "1");
        store.put("dev/b", "1");

        assert_eq!(store.prefix_index("dev/"), 3);
        assert_eq!(store.prefix_index("prod/"), 2);
        assert_eq!(store.prefix_index("staging/"), 0);
        assert_eq!(store.keys("dev/"), vec!["dev/a", "dev/b"]);
    }

    #[test]
    fn test_delete_advances_prefix_index() {
        let store = MemoryStore::new();
        store.put("dev/a", "1");
        assert!(store.delete("dev/a"));
        assert!(!store.delete("dev/a"));

        assert_eq!(store.prefix_index("dev/"), 2);
        assert!(store.keys("dev/").is_empty());
    }

    #[tokio::test]
    async fn test_watch_returns_immediately_when_behind() {
        let store = MemoryStore::new();
        store.put("dev/a", "1");
        assert_eq!(store.watch_prefix("dev/", 0).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_times_out_with_same_index() {
        let store = MemoryStore::new().with_wait_time(Duration::from_secs(5));
        store.put("dev/a", "1");
        assert_eq!(store.watch_prefix("dev/", 1).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_wakes_on_write_under_prefix() {
        let store = Arc::new(MemoryStore::new().with_wait_time(Duration::from_secs(60)));
        store.put("dev/a", "1");

        let writer = Arc::clone(&store);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            writer.put("prod/a", "ignored");
            tokio::time::sleep(Duration::from_secs(1)).await;
            writer.put("dev/b", "2");
        });

        let started = tokio::time::Instant::now();
        let index = store.watch_prefix("dev/", 1).await.unwrap();
        assert_eq!(index, 3);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }
}
