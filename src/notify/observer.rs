//! Observation hooks for watch loops.

use crate::error::KvError;
use std::sync::Arc;

/// Receives events from every prefix watch loop.
///
/// Watch loops never surface errors to the caller of
/// [`PrefixWatcher::start`](super::PrefixWatcher::start); they retry forever.
/// Implement this trait to make those failures (and changes) visible, e.g. to
/// feed metrics or alerting. All methods default to no-ops and are called
/// synchronously from the watch task, so keep them cheap.
pub trait WatchObserver: Send + Sync {
    /// A blocking call is about to be issued.
    fn on_poll(&self, _prefix: &str, _since_index: u64) {}

    /// A blocking call succeeded, whether or not the index moved.
    fn on_success(&self, _prefix: &str, _index: u64) {}

    /// The prefix index advanced; the update callback runs right after this.
    fn on_change(&self, _prefix: &str, _previous: u64, _current: u64) {}

    /// The update callback panicked while handling `index`.
    ///
    /// The index stays recorded, so that change is not delivered again.
    fn on_callback_panic(&self, _prefix: &str, _index: u64, _message: &str) {}

    /// A blocking call failed; the loop sleeps and retries with `since_index`.
    fn on_error(&self, _prefix: &str, _since_index: u64, _error: &KvError, _consecutive_failures: u32) {}

    /// The loop for `prefix` exited after a stop signal.
    fn on_stopped(&self, _prefix: &str, _last_index: u64) {}
}

/// Emits structured `tracing` events for every watch loop event.
///
/// Installed on every [`PrefixWatcher`](super::PrefixWatcher).
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl WatchObserver for TracingObserver {
    fn on_poll(&self, prefix: &str, since_index: u64) {
        tracing::trace!(prefix, index = since_index, "Polling prefix");
    }

    fn on_success(&self, prefix: &str, index: u64) {
        tracing::trace!(prefix, index, "Poll returned");
    }

    fn on_change(&self, prefix: &str, previous: u64, current: u64) {
        tracing::info!(prefix, previous, current, "Prefix changed");
    }

    fn on_callback_panic(&self, prefix: &str, index: u64, message: &str) {
        tracing::error!(prefix, index, panic = message, "Update callback panicked");
    }

    fn on_error(&self, prefix: &str, since_index: u64, error: &KvError, consecutive_failures: u32) {
        tracing::warn!(
            prefix,
            index = since_index,
            consecutive_failures,
            error = %error,
            "Watch failed, retrying"
        );
    }

    fn on_stopped(&self, prefix: &str, last_index: u64) {
        tracing::debug!(prefix, index = last_index, "Prefix watch stopped");
    }
}

/// Fans events out to several observers in registration order.
pub(crate) struct ObserverSet(pub(crate) Vec<Arc<dyn WatchObserver>>);

impl WatchObserver for ObserverSet {
    fn on_poll(&self, prefix: &str, since_index: u64) {
        for observer in &self.0 {
            observer.on_poll(prefix, since_index);
        }
    }

    fn on_success(&self, prefix: &str, index: u64) {
        for observer in &self.0 {
            observer.on_success(prefix, index);
        }
    }

    fn on_change(&self, prefix: &str, previous: u64, current: u64) {
        for observer in &self.0 {
            observer.on_change(prefix, previous, current);
        }
    }

    fn on_callback_panic(&self, prefix: &str, index: u64, message: &str) {
        for observer in &self.0 {
            observer.on_callback_panic(prefix, index, message);
        }
    }

    fn on_error(&self, prefix: &str, since_index: u64, error: &KvError, consecutive_failures: u32) {
        for observer in &self.0 {
            observer.on_error(prefix, since_index, error, consecutive_failures);
        }
    }

    fn on_stopped(&self, prefix: &str, last_index: u64) {
        for observer in &self.0 {
            observer.on_stopped(prefix, last_index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingObserver {
        errors: AtomicUsize,
        changes: AtomicUsize,
        successes: AtomicUsize,
        panics: AtomicUsize,
    }

    impl WatchObserver for CountingObserver {
        fn on_success(&self, _prefix: &str, _index: u64) {
            self.successes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_callback_panic(&self, _prefix: &str, _index: u64, _message: &str) {
            self.panics.fetch_add(1, Ordering::SeqCst);
        }

        fn on_change(&self, _prefix: &str, _previous: u64, _current: u64) {
            self.changes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_error(&self, _prefix: &str, _since: u64, _error: &KvError, _failures: u32) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_observer_set_fans_out() {
        let first = Arc::new(CountingObserver::default());
        let second = Arc::new(CountingObserver::default());
        let set = ObserverSet(vec![
            Arc::new(TracingObserver) as Arc<dyn WatchObserver>,
            first.clone(),
            second.clone(),
        ]);

        set.on_poll("dev/", 0);
        set.on_success("dev/", 5);
        set.on_change("dev/", 0, 5);
        set.on_callback_panic("dev/", 5, "boom");
        set.on_error("dev/", 5, &KvError::Transport("refused".into()), 1);
        set.on_stopped("dev/", 5);

        assert_eq!(first.changes.load(Ordering::SeqCst), 1);
        assert_eq!(first.errors.load(Ordering::SeqCst), 1);
        assert_eq!(second.changes.load(Ordering::SeqCst), 1);
        assert_eq!(second.errors.load(Ordering::SeqCst), 1);
        assert_eq!(second.successes.load(Ordering::SeqCst), 1);
        assert_eq!(second.panics.load(Ordering::SeqCst), 1);
    }
}
