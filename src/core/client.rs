//! The main client handle for reads and watches.

use crate::core::{KvClientBuilder, KvValue, ValueMapper};
use crate::error::{KvError, Result};
use crate::notify::{DEFAULT_RETRY_DELAY, PrefixWatcher};
use crate::sources::KvStore;
use std::sync::Arc;
use std::time::Duration;

/// Client for reading configuration values and watching prefixes.
///
/// Cheap to clone; clones share the same store gateway.
///
/// # Examples
///
/// ```rust,no_run
/// use consul_kv_config::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let client = KvClient::new(&["10.10.28.2:8500"], "http")?;
///
/// let port = match client.get("dev/port").await {
///     Ok(value) => value.i32_or(8080),
///     Err(KvError::NotFound { .. }) => 8080,
///     Err(e) => return Err(e),
/// };
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct KvClient {
    store: Arc<dyn KvStore>,
    retry_delay: Duration,
}

impl KvClient {
    /// Create a Consul client from a list of node addresses and a URI scheme.
    ///
    /// Only the first address is used. An empty list targets the local agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheme is not `http`/`https` or the address is invalid.
    #[cfg(feature = "consul")]
    pub fn new<S: AsRef<str>>(nodes: &[S], scheme: &str) -> Result<Self> {
        KvClientBuilder::new()
            .with_nodes(nodes.iter().map(|n| n.as_ref().to_string()))
            .with_scheme(scheme)
            .build()
    }

    /// Create a new builder for constructing a client.
    pub fn builder() -> KvClientBuilder {
        KvClientBuilder::new()
    }

    /// Wrap an existing store gateway.
    pub fn from_store(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub(crate) fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// The underlying store gateway.
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Read a single key.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::NotFound`] if the key does not exist, or a
    /// transport-class error if the store cannot be reached.
    pub async fn get(&self, key: &str) -> Result<KvValue> {
        self.fetch(key).await.map(KvValue::new)
    }

    /// Read a single key and transform its string form with `mapper`.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    pub async fn get_with<F>(&self, key: &str, mapper: F) -> Result<KvValue>
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        let mapper: ValueMapper = Arc::new(mapper);
        self.fetch(key)
            .await
            .map(|pair| KvValue::with_mapper(pair, mapper))
    }

    async fn fetch(&self, key: &str) -> Result<crate::sources::KvPair> {
        self.store
            .get(key)
            .await?
            .ok_or_else(|| KvError::NotFound {
                key: key.to_string(),
            })
    }

    /// Issue one blocking query on `prefix` and return the store's index.
    ///
    /// # Errors
    ///
    /// Returns a transport-class error on failure; retry with the same `since_index`.
    pub async fn watch_prefix(&self, prefix: &str, since_index: u64) -> Result<u64> {
        self.store.watch_prefix(prefix, since_index).await
    }

    /// Create a [`PrefixWatcher`] on this client's store.
    ///
    /// The watcher inherits the client's retry delay.
    pub fn watcher<F>(&self, on_update: F) -> PrefixWatcher
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        PrefixWatcher::new(Arc::clone(&self.store), on_update).with_retry_delay(self.retry_delay)
    }
}
