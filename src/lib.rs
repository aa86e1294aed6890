//! # consul-kv-config
//!
//! Typed configuration reads and per-prefix change notifications on top of the
//! Consul KV blocking-query API.
//!
//! ## Overview
//!
//! `consul-kv-config` lets an application:
//! - Fetch single keys and coerce them to booleans, numbers, durations, times or JSON
//! - Tell a missing key apart from a store that cannot be reached
//! - Get a callback whenever anything under a key prefix changes, without
//!   writing its own polling or index bookkeeping
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use consul_kv_config::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let client = KvClient::new(&["10.10.28.2:8500"], "http")?;
//!
//! // One-shot read with a fallback for missing or malformed values
//! let max_conns = match client.get("dev/max_connections").await {
//!     Ok(value) => value.i32_or(100),
//!     Err(e) if e.is_not_found() => 100,
//!     Err(e) => return Err(e),
//! };
//!
//! // Re-read whenever anything under dev/ changes
//! let watcher = client.watcher(|prefix| {
//!     println!("{} changed", prefix);
//! });
//! watcher.register("dev/")?;
//! watcher.start()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Watch semantics
//!
//! Each registered prefix runs its own blocking-query loop. The callback fires
//! once per strict increase of the prefix index and runs on Tokio's blocking
//! pool, so a slow callback only delays its own prefix. Failed calls are
//! retried forever after a fixed delay (2 seconds by default); failures and
//! callback panics are reported through [`notify::WatchObserver`] hooks, which
//! log via `tracing` out of the box.
//!
//! ## Feature Flags
//!
//! - `consul` (default): the HTTP gateway to a Consul agent
//! - `metrics`: OpenTelemetry instruments for watch loops

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod notify;
pub mod sources;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{ClientSettings, KvClient, KvClientBuilder, KvValue};
    pub use crate::error::{KvError, Result};
    pub use crate::notify::{PrefixWatcher, WatchObserver};
    pub use crate::sources::{KvStore, MemoryStore};
}
