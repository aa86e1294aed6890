//! Error types for consul-kv-config.

/// Result type alias for consul-kv-config operations.
pub type Result<T> = std::result::Result<T, KvError>;

/// Errors that can occur when reading or watching the key-value store.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// The key does not exist in the store.
    #[error("Key not found: {key}")]
    NotFound {
        /// The key that was looked up
        key: String,
    },

    /// The store could not be reached, or the connection failed mid-request.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The store answered with an unexpected HTTP status.
    #[error("Unexpected status {status} from store: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, as far as it could be read
        body: String,
    },

    /// The store answered but the response could not be understood.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A stored value could not be converted to the requested type.
    #[error("Cannot convert value of '{key}' to {target}: {reason}")]
    Conversion {
        /// The key the value was read from
        key: String,
        /// Name of the requested type
        target: &'static str,
        /// Why the conversion failed
        reason: String,
    },

    /// Client configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The watcher was already started, so the operation is no longer allowed.
    #[error("Watcher already started")]
    AlreadyStarted,

    /// Watch loops need a Tokio runtime to run on.
    #[error("No Tokio runtime available to spawn watch tasks")]
    NoRuntime,
}

impl KvError {
    /// Create a conversion error.
    pub fn conversion(
        key: impl Into<String>,
        target: &'static str,
        reason: impl ToString,
    ) -> Self {
        Self::Conversion {
            key: key.into(),
            target,
            reason: reason.to_string(),
        }
    }

    /// Returns `true` if the key was absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` for failures reaching the store or reading its response.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Status { .. } | Self::Protocol(_)
        )
    }
}

impl From<config::ConfigError> for KvError {
    fn from(err: config::ConfigError) -> Self {
        KvError::Config(err.to_string())
    }
}
