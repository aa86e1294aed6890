//! Consul KV store over HTTP/HTTPS.

use super::{KvPair, KvStore};
use crate::error::{KvError, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::HeaderValue;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;

/// Header carrying the store's change index on every KV response.
const INDEX_HEADER: &str = "X-Consul-Index";
/// Header carrying the ACL token.
const TOKEN_HEADER: &str = "X-Consul-Token";

/// Default agent address when no node is configured.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:8500";

/// One entry of a `/v1/kv` JSON response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConsulEntry {
    key: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    flags: u64,
    #[serde(default)]
    create_index: u64,
    #[serde(default)]
    modify_index: u64,
}

/// Consul-backed [`KvStore`].
///
/// Point reads hit `GET /v1/kv/<key>`; prefix watches issue blocking queries
/// (`?keys&index=<n>&wait=<d>`) and read the new index from the
/// `X-Consul-Index` response header.
///
/// # Examples
///
/// ```rust,no_run
/// use consul_kv_config::sources::ConsulStore;
/// use std::time::Duration;
///
/// # fn example() -> consul_kv_config::error::Result<()> {
/// let store = ConsulStore::builder()
///     .with_address("10.10.28.2:8500")
///     .with_scheme("http")
///     .with_token("secret-token")
///     .with_wait_time(Duration::from_secs(30))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ConsulStore {
    base_url: Url,
    client: Client,
    token: Option<String>,
    datacenter: Option<String>,
    wait_time: Duration,
    request_timeout: Duration,
}

impl ConsulStore {
    /// Create a new builder for constructing a Consul store.
    pub fn builder() -> ConsulStoreBuilder {
        ConsulStoreBuilder::new()
    }

    /// How long the server is asked to hold a blocking query open.
    pub fn wait_time(&self) -> Duration {
        self.wait_time
    }

    /// Build the URL for a key or prefix under `/v1/kv/`.
    fn kv_url(&self, key: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| KvError::Config(format!("Cannot use '{}' as a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(key.trim_start_matches('/').split('/'));
        Ok(url)
    }

    /// Attach token and datacenter to a request.
    fn decorate(&self, mut request: RequestBuilder) -> Result<RequestBuilder> {
        if let Some(token) = &self.token {
            let header_value = HeaderValue::from_str(token)
                .map_err(|e| KvError::Config(format!("Invalid ACL token: {}", e)))?;
            request = request.header(TOKEN_HEADER, header_value);
        }
        if let Some(dc) = &self.datacenter {
            request = request.query(&[("dc", dc.as_str())]);
        }
        Ok(request)
    }

    /// Upper bound for a blocking query, including the server's wait jitter.
    fn blocking_timeout(&self) -> Duration {
        self.wait_time + self.wait_time / 16 + self.request_timeout
    }
}

#[async_trait]
impl KvStore for ConsulStore {
    async fn get(&self, key: &str) -> Result<Option<KvPair>> {
        let request = self.decorate(self.client.get(self.kv_url(key)?))?;

        let response = request
            .send()
            .await
            .map_err(|e| KvError::Transport(format!("GET {} failed: {}", key, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(KvError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let entries: Vec<ConsulEntry> = response
            .json()
            .await
            .map_err(|e| KvError::Protocol(format!("Failed to parse KV response: {}", e)))?;

        entries.into_iter().next().map(entry_to_pair).transpose()
    }

    async fn watch_prefix(&self, prefix: &str, since_index: u64) -> Result<u64> {
        let wait = format!("{}ms", self.wait_time.as_millis());
        let index = since_index.to_string();
        let request = self
            .client
            .get(self.kv_url(prefix)?)
            .query(&[("keys", "true"), ("index", index.as_str()), ("wait", wait.as_str())])
            .timeout(self.blocking_timeout());
        let request = self.decorate(request)?;

        let response = request
            .send()
            .await
            .map_err(|e| KvError::Transport(format!("Blocking list of {} failed: {}", prefix, e)))?;

        // An empty prefix answers 404 but still carries a valid index.
        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(KvError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let index = parse_index(response.headers().get(INDEX_HEADER))?;

        // Drain the key listing so the connection can be reused.
        response
            .bytes()
            .await
            .map_err(|e| KvError::Transport(format!("Reading list of {} failed: {}", prefix, e)))?;

        Ok(index)
    }

    fn name(&self) -> String {
        format!("consul:{}", self.base_url)
    }
}

/// Parse the `X-Consul-Index` header.
fn parse_index(header: Option<&HeaderValue>) -> Result<u64> {
    let header = header
        .ok_or_else(|| KvError::Protocol(format!("Response is missing the {} header", INDEX_HEADER)))?;
    header
        .to_str()
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .ok_or_else(|| KvError::Protocol(format!("Invalid {} header: {:?}", INDEX_HEADER, header)))
}

/// Decode a JSON entry; Consul ships values base64-encoded and null for empty values.
fn entry_to_pair(entry: ConsulEntry) -> Result<KvPair> {
    let value = match entry.value {
        Some(encoded) => STANDARD.decode(encoded.as_bytes()).map_err(|e| {
            KvError::Protocol(format!("Value of '{}' is not valid base64: {}", entry.key, e))
        })?,
        None => Vec::new(),
    };

    Ok(KvPair {
        key: entry.key,
        value,
        flags: entry.flags,
        create_index: entry.create_index,
        modify_index: entry.modify_index,
    })
}

/// Builder for constructing a `ConsulStore`.
pub struct ConsulStoreBuilder {
    address: Option<String>,
    scheme: String,
    token: Option<String>,
    datacenter: Option<String>,
    wait_time: Duration,
    request_timeout: Duration,
}

impl ConsulStoreBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            address: None,
            scheme: "http".to_string(),
            token: None,
            datacenter: None,
            wait_time: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Set the agent address (`host:port`).
    ///
    /// Default is `127.0.0.1:8500`.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Set the URI scheme, `http` or `https`.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Set the ACL token sent with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Query a specific datacenter instead of the agent's own.
    pub fn with_datacenter(mut self, datacenter: impl Into<String>) -> Self {
        self.datacenter = Some(datacenter.into());
        self
    }

    /// Set how long the server holds a blocking query open.
    ///
    /// Default is 60 seconds.
    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = wait_time;
        self
    }

    /// Set the timeout for non-blocking requests.
    ///
    /// Blocking queries get this on top of the wait time. Default is 10 seconds.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Build the Consul store.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The scheme is neither `http` nor `https`
    /// - The address does not form a valid URL
    /// - The HTTP client cannot be constructed
    pub fn build(self) -> Result<ConsulStore> {
        let scheme = self.scheme.to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(KvError::Config(format!(
                "Unsupported scheme '{}': expected http or https",
                self.scheme
            )));
        }

        let address = self
            .address
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
        let base_url = Url::parse(&format!("{}://{}/v1/kv/", scheme, address.trim()))
            .map_err(|e| KvError::Config(format!("Invalid store address '{}': {}", address, e)))?;

        let client = Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| KvError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(ConsulStore {
            base_url,
            client,
            token: self.token,
            datacenter: self.datacenter,
            wait_time: self.wait_time,
            request_timeout: self.request_timeout,
        })
    }
}

impl Default for ConsulStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}
