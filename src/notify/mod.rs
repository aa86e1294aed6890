//! Configuration change notification system.
//!
//! Runs one blocking-query loop per watched key prefix and calls back when
//! the store reports a newer index for that prefix.

pub mod observer;
pub mod watcher;

pub use observer::{TracingObserver, WatchObserver};
pub use watcher::{DEFAULT_RETRY_DELAY, PrefixWatcher, UpdateCallback};
