//! Builder for constructing KvClient instances.

use crate::core::{ClientSettings, KvClient};
use crate::error::Result;
use crate::notify::DEFAULT_RETRY_DELAY;
use crate::sources::KvStore;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "consul")]
use crate::sources::ConsulStore;

/// Builder for constructing a [`KvClient`].
///
/// # Examples
///
/// ```rust,no_run
/// use consul_kv_config::prelude::*;
/// use std::time::Duration;
///
/// # fn example() -> Result<()> {
/// let client = KvClient::builder()
///     .with_nodes(["10.10.28.2:8500"])
///     .with_scheme("https")
///     .with_token("secret-token")
///     .with_wait_time(Duration::from_secs(30))
///     .with_retry_delay(Duration::from_secs(5))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct KvClientBuilder {
    nodes: Vec<String>,
    scheme: String,
    token: Option<String>,
    datacenter: Option<String>,
    wait_time: Duration,
    request_timeout: Duration,
    retry_delay: Duration,
    store: Option<Arc<dyn KvStore>>,
}

impl KvClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            scheme: "http".to_string(),
            token: None,
            datacenter: None,
            wait_time: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
            retry_delay: DEFAULT_RETRY_DELAY,
            store: None,
        }
    }

    /// Set the store node addresses (`host:port`).
    ///
    /// Only the first address is used; the others are ignored.
    pub fn with_nodes<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nodes = nodes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the URI scheme, `http` or `https`.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Set the ACL token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Query a specific datacenter.
    pub fn with_datacenter(mut self, datacenter: impl Into<String>) -> Self {
        self.datacenter = Some(datacenter.into());
        self
    }

    /// Set how long the store holds a blocking query open.
    ///
    /// Default is 60 seconds.
    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = wait_time;
        self
    }

    /// Set the timeout for non-blocking requests.
    ///
    /// Default is 10 seconds.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the pause between failed watch attempts for watchers created by the client.
    ///
    /// Default is 2 seconds.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Apply loaded [`ClientSettings`], replacing every connection option.
    pub fn with_settings(mut self, settings: &ClientSettings) -> Self {
        self.nodes = settings.nodes.clone();
        self.scheme = settings.scheme.clone();
        self.token = settings.token.clone();
        self.datacenter = settings.datacenter.clone();
        self.wait_time = settings.wait_time();
        self.request_timeout = settings.request_timeout();
        self.retry_delay = settings.retry_delay();
        self
    }

    /// Use a custom store instead of connecting to Consul.
    ///
    /// Connection options are ignored when a store is given.
    pub fn with_store<S: KvStore + 'static>(mut self, store: S) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The scheme is not `http` or `https`
    /// - The first node address is invalid
    /// - No custom store was given and the `consul` feature is disabled
    pub fn build(mut self) -> Result<KvClient> {
        let store = match self.store.take() {
            Some(store) => store,
            None => self.connect()?,
        };

        tracing::debug!(store = %store.name(), "Built KV client");
        Ok(KvClient::from_store(store).with_retry_delay(self.retry_delay))
    }

    #[cfg(feature = "consul")]
    fn connect(&self) -> Result<Arc<dyn KvStore>> {
        if self.nodes.len() > 1 {
            tracing::debug!(
                ignored = self.nodes.len() - 1,
                "Only the first store node is used"
            );
        }

        let mut builder = ConsulStore::builder()
            .with_scheme(self.scheme.as_str())
            .with_wait_time(self.wait_time)
            .with_request_timeout(self.request_timeout);
        if let Some(address) = self.nodes.first() {
            builder = builder.with_address(address.as_str());
        }
        if let Some(token) = &self.token {
            builder = builder.with_token(token.as_str());
        }
        if let Some(datacenter) = &self.datacenter {
            builder = builder.with_datacenter(datacenter.as_str());
        }

        Ok(Arc::new(builder.build()?))
    }

    #[cfg(not(feature = "consul"))]
    fn connect(&self) -> Result<Arc<dyn KvStore>> {
        Err(crate::error::KvError::Config(
            "No store given and the 'consul' feature is disabled".to_string(),
        ))
    }
}

impl Default for KvClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
