//! Client settings loaded from a file and environment variables.

use crate::error::Result;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix used by [`ClientSettings::load`].
pub const DEFAULT_ENV_PREFIX: &str = "CONSUL_KV";

/// Connection and watch settings for a [`KvClient`](crate::core::KvClient).
///
/// Settings come from an optional YAML/TOML/JSON file (format picked by
/// extension), overridden by environment variables. With the default prefix,
/// `CONSUL_KV_SCHEME=https` sets `scheme` and `CONSUL_KV_NODES=a:8500,b:8500`
/// sets `nodes`.
///
/// # Examples
///
/// ```rust,no_run
/// use consul_kv_config::core::{ClientSettings, KvClient};
/// use std::path::Path;
///
/// # fn example() -> consul_kv_config::error::Result<()> {
/// let settings = ClientSettings::load(Some(Path::new("config/consul.yaml")))?;
/// let client = KvClient::builder().with_settings(&settings).build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Store node addresses (`host:port`); only the first is used.
    pub nodes: Vec<String>,
    /// URI scheme, `http` or `https`.
    pub scheme: String,
    /// ACL token.
    pub token: Option<String>,
    /// Datacenter to query instead of the agent's own.
    pub datacenter: Option<String>,
    /// How long the store holds a blocking query open, in seconds.
    pub wait_time_secs: u64,
    /// Timeout for non-blocking requests, in seconds.
    pub request_timeout_secs: u64,
    /// Pause between failed watch attempts, in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            scheme: "http".to_string(),
            token: None,
            datacenter: None,
            wait_time_secs: 60,
            request_timeout_secs: 10,
            retry_delay_ms: 2000,
        }
    }
}

impl ClientSettings {
    /// Load settings using the `CONSUL_KV` environment prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or malformed, or if a value
    /// has the wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env_prefix(path, DEFAULT_ENV_PREFIX)
    }

    /// Load settings with a custom environment prefix.
    ///
    /// # Arguments
    ///
    /// * `path` - Optional settings file
    /// * `env_prefix` - Prefix for environment variables (e.g., "APP_CONSUL")
    pub fn load_with_env_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let env_source = Environment::with_prefix(env_prefix)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("nodes");

        let settings: Self = builder.add_source(env_source).build()?.try_deserialize()?;
        tracing::debug!(nodes = ?settings.nodes, scheme = %settings.scheme, "Loaded client settings");
        Ok(settings)
    }

    /// Blocking query wait time.
    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(self.wait_time_secs)
    }

    /// Timeout for non-blocking requests.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Pause between failed watch attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
