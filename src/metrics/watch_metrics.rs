//! Watch loop metrics using OpenTelemetry.

use crate::error::KvError;
use crate::notify::WatchObserver;
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Meter};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Metrics collector for prefix watch loops.
///
/// Plug it into a watcher with
/// [`PrefixWatcher::with_observer`](crate::notify::PrefixWatcher::with_observer).
/// Every instrument carries a `prefix` attribute.
///
/// # Examples
///
/// ```rust,no_run
/// use consul_kv_config::metrics::WatchMetrics;
/// use opentelemetry::global;
///
/// let meter = global::meter("consul-kv-config");
/// let metrics = WatchMetrics::new(meter);
/// ```
#[derive(Clone)]
pub struct WatchMetrics {
    polls: Counter<u64>,
    changes: Counter<u64>,
    errors: Counter<u64>,
    callback_panics: Counter<u64>,
    failure_gauge: Gauge<u64>,
    failure_streaks: Arc<parking_lot::Mutex<HashMap<String, u32>>>,
    last_change: Arc<parking_lot::Mutex<Option<Instant>>>,
}

impl WatchMetrics {
    /// Create a new metrics collector with the provided meter.
    pub fn new(meter: Meter) -> Self {
        let polls = meter
            .u64_counter("consul_kv.watch.polls")
            .with_description("Blocking calls issued")
            .build();

        let changes = meter
            .u64_counter("consul_kv.watch.changes")
            .with_description("Index advances that fired the update callback")
            .build();

        let errors = meter
            .u64_counter("consul_kv.watch.errors")
            .with_description("Failed blocking calls")
            .build();

        let callback_panics = meter
            .u64_counter("consul_kv.watch.callback_panics")
            .with_description("Update callbacks that panicked")
            .build();

        let failure_gauge = meter
            .u64_gauge("consul_kv.watch.consecutive_failures")
            .with_description("Failed blocking calls since the last success")
            .build();

        Self {
            polls,
            changes,
            errors,
            callback_panics,
            failure_gauge,
            failure_streaks: Arc::new(parking_lot::Mutex::new(HashMap::new())),
            last_change: Arc::new(parking_lot::Mutex::new(None)),
        }
    }

    /// Failed calls on `prefix` since its last successful one.
    pub fn consecutive_failures(&self, prefix: &str) -> u32 {
        self.failure_streaks.lock().get(prefix).copied().unwrap_or(0)
    }

    fn record_streak(&self, prefix: &str, failures: u32) {
        self.failure_streaks.lock().insert(prefix.to_string(), failures);
        self.failure_gauge
            .record(u64::from(failures), &prefix_attr(prefix));
    }

    /// Time since any watched prefix last changed, or `None` if none has yet.
    pub fn since_last_change(&self) -> Option<Duration> {
        self.last_change.lock().as_ref().map(Instant::elapsed)
    }
}

fn prefix_attr(prefix: &str) -> [KeyValue; 1] {
    [KeyValue::new("prefix", prefix.to_string())]
}

impl WatchObserver for WatchMetrics {
    fn on_poll(&self, prefix: &str, _since_index: u64) {
        self.polls.add(1, &prefix_attr(prefix));
    }

    fn on_success(&self, prefix: &str, _index: u64) {
        self.record_streak(prefix, 0);
    }

    fn on_change(&self, prefix: &str, _previous: u64, _current: u64) {
        self.changes.add(1, &prefix_attr(prefix));
        *self.last_change.lock() = Some(Instant::now());
    }

    fn on_callback_panic(&self, prefix: &str, _index: u64, _message: &str) {
        self.callback_panics.add(1, &prefix_attr(prefix));
    }

    fn on_error(&self, prefix: &str, _since_index: u64, _error: &KvError, consecutive_failures: u32) {
        self.errors.add(1, &prefix_attr(prefix));
        self.record_streak(prefix, consecutive_failures);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::global;

    #[test]
    fn test_metrics_creation() {
        let metrics = WatchMetrics::new(global::meter("test"));

        // Recording must not panic without an installed provider.
        metrics.on_poll("dev/", 0);
        metrics.on_error("dev/", 0, &KvError::Transport("refused".into()), 1);
        metrics.on_success("dev/", 5);
        metrics.on_change("dev/", 0, 5);
        metrics.on_callback_panic("dev/", 5, "boom");
        metrics.on_stopped("dev/", 5);
    }

    #[test]
    fn test_success_without_change_resets_failure_streak() {
        let metrics = WatchMetrics::new(global::meter("test"));
        let refused = KvError::Transport("refused".into());

        metrics.on_error("dev/", 0, &refused, 1);
        metrics.on_error("dev/", 0, &refused, 2);
        metrics.on_error("prod/", 0, &refused, 1);
        assert_eq!(metrics.consecutive_failures("dev/"), 2);

        // Long poll timed out with the same index: no change, but a success.
        metrics.on_success("dev/", 0);
        assert_eq!(metrics.consecutive_failures("dev/"), 0);
        assert_eq!(metrics.consecutive_failures("prod/"), 1);
        assert!(metrics.since_last_change().is_none());
    }

    #[test]
    fn test_last_change_tracking() {
        let metrics = WatchMetrics::new(global::meter("test"));
        assert!(metrics.since_last_change().is_none());

        metrics.on_change("dev/", 0, 5);
        assert!(metrics.since_last_change().is_some());
    }

    #[test]
    fn test_metrics_clone_shares_state() {
        let metrics = WatchMetrics::new(global::meter("test"));
        let cloned = metrics.clone();

        cloned.on_change("dev/", 0, 1);
        assert!(metrics.since_last_change().is_some());
    }
}
