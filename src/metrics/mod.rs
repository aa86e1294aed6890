//! Built-in metrics for watch loops.
//!
//! Provides OpenTelemetry metrics tracking:
//! - Blocking calls issued per prefix
//! - Detected changes per prefix
//! - Failed calls and the current failure streak
//! - Update callbacks that panicked
//!
//! # Examples
//!
//! ```rust,no_run
//! use consul_kv_config::metrics::WatchMetrics;
//! use consul_kv_config::prelude::*;
//! use opentelemetry::global;
//!
//! # async fn example() -> Result<()> {
//! let client = KvClient::new(&["127.0.0.1:8500"], "http")?;
//! let watcher = client
//!     .watcher(|prefix| println!("{} changed", prefix))
//!     .with_observer(WatchMetrics::new(global::meter("my-app")));
//! watcher.register("dev/")?;
//! watcher.start()?;
//! # Ok(())
//! # }
//! ```

mod watch_metrics;

pub use watch_metrics::WatchMetrics;
