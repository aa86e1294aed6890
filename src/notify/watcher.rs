//! Per-prefix change watching over blocking queries.

use super::observer::{ObserverSet, TracingObserver, WatchObserver};
use crate::error::{KvError, Result};
use crate::sources::KvStore;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Pause between a failed blocking call and its retry.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Callback invoked with the prefix name whenever that prefix changes.
pub type UpdateCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Last-known index of one watched prefix. Only its own task writes `index`.
struct PrefixCell {
    prefix: String,
    index: AtomicU64,
}

enum Lifecycle {
    Idle,
    Running {
        shutdown: watch::Sender<bool>,
        tasks: Vec<JoinHandle<()>>,
    },
    Stopped,
}

struct WatcherState {
    cells: BTreeMap<String, Arc<PrefixCell>>,
    lifecycle: Lifecycle,
}

/// Watches key prefixes and calls back when anything under them changes.
///
/// Each registered prefix gets its own Tokio task running a blocking-query
/// loop. When the store reports an index greater than the last one seen, the
/// new index is recorded and the callback runs with the prefix name; the
/// callback should re-read whatever keys it cares about. Equal or smaller
/// indices are ignored. The callback runs on Tokio's blocking pool and the
/// prefix's loop waits for it, so a slow callback delays only its own prefix.
/// A panicking callback is reported through
/// [`WatchObserver::on_callback_panic`] and the loop keeps going.
///
/// Failed calls are retried forever after a fixed delay, using the same
/// index, and reported only to the installed [`WatchObserver`]s.
///
/// Prefixes must be registered before [`start`](Self::start); registering
/// afterwards returns [`KvError::AlreadyStarted`]. Indices start at 0, so the
/// first poll of a non-empty prefix fires the callback once right after start.
///
/// # Examples
///
/// ```rust,no_run
/// use consul_kv_config::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let client = KvClient::new(&["10.10.28.2:8500"], "http")?;
///
/// let watcher = client.watcher(|prefix| {
///     println!("{} changed, reloading", prefix);
/// });
/// watcher.register("dev/")?;
/// watcher.register("shared/")?;
/// watcher.start()?;
///
/// // ... later
/// watcher.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct PrefixWatcher {
    store: Arc<dyn KvStore>,
    on_update: UpdateCallback,
    observers: Vec<Arc<dyn WatchObserver>>,
    retry_delay: Duration,
    state: Mutex<WatcherState>,
}

impl PrefixWatcher {
    /// Create a watcher over `store` that calls `on_update` on every change.
    pub fn new<F>(store: Arc<dyn KvStore>, on_update: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            store,
            on_update: Arc::new(on_update),
            observers: vec![Arc::new(TracingObserver)],
            retry_delay: DEFAULT_RETRY_DELAY,
            state: Mutex::new(WatcherState {
                cells: BTreeMap::new(),
                lifecycle: Lifecycle::Idle,
            }),
        }
    }

    /// Set the pause between a failed call and its retry.
    ///
    /// Default is 2 seconds.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Add an observer for watch events, on top of the built-in tracing one.
    pub fn with_observer<O>(mut self, observer: O) -> Self
    where
        O: WatchObserver + 'static,
    {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Add a prefix to watch, starting from index 0.
    ///
    /// Registering the same prefix twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::AlreadyStarted`] once [`start`](Self::start) has been called.
    pub fn register(&self, prefix: impl Into<String>) -> Result<()> {
        let prefix = prefix.into();
        let mut state = self.state.lock();
        if !matches!(state.lifecycle, Lifecycle::Idle) {
            return Err(KvError::AlreadyStarted);
        }

        state.cells.entry(prefix.clone()).or_insert_with(|| {
            Arc::new(PrefixCell {
                prefix,
                index: AtomicU64::new(0),
            })
        });
        Ok(())
    }

    /// Spawn one watch task per registered prefix and return immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The watcher was already started (or stopped)
    /// - No Tokio runtime is running on this thread
    pub fn start(&self) -> Result<()> {
        let runtime = Handle::try_current().map_err(|_| KvError::NoRuntime)?;

        let mut state = self.state.lock();
        if !matches!(state.lifecycle, Lifecycle::Idle) {
            return Err(KvError::AlreadyStarted);
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let observers = Arc::new(ObserverSet(self.observers.clone()));

        let tasks = state
            .cells
            .values()
            .map(|cell| {
                let task = PrefixTask {
                    cell: Arc::clone(cell),
                    store: Arc::clone(&self.store),
                    on_update: Arc::clone(&self.on_update),
                    observers: Arc::clone(&observers),
                    retry_delay: self.retry_delay,
                    shutdown: shutdown_rx.clone(),
                };
                runtime.spawn(task.run())
            })
            .collect();

        tracing::info!(
            prefixes = state.cells.len(),
            store = %self.store.name(),
            "Started prefix watcher"
        );
        state.lifecycle = Lifecycle::Running { shutdown, tasks };
        Ok(())
    }

    /// Signal every watch task to exit and wait for all of them.
    ///
    /// In-flight blocking calls and retry sleeps are abandoned; a callback
    /// that is already running is allowed to finish. Calling this
    /// on a watcher that was never started does nothing.
    pub async fn stop(&self) {
        let tasks = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut state.lifecycle, Lifecycle::Stopped) {
                Lifecycle::Running { shutdown, tasks } => {
                    shutdown.send_replace(true);
                    tasks
                }
                other => {
                    state.lifecycle = other;
                    return;
                }
            }
        };

        for task in tasks {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "Prefix watch task ended abnormally");
            }
        }
        tracing::info!("Stopped prefix watcher");
    }

    /// Pause between a failed call and its retry.
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Registered prefixes, in order.
    pub fn prefixes(&self) -> Vec<String> {
        self.state.lock().cells.keys().cloned().collect()
    }

    /// Last index observed for `prefix`, or `None` if it is not registered.
    pub fn last_index(&self, prefix: &str) -> Option<u64> {
        self.state
            .lock()
            .cells
            .get(prefix)
            .map(|cell| cell.index.load(Ordering::Acquire))
    }

    /// Whether the watch tasks are running.
    pub fn is_running(&self) -> bool {
        matches!(self.state.lock().lifecycle, Lifecycle::Running { .. })
    }
}

/// Everything one prefix loop owns.
struct PrefixTask {
    cell: Arc<PrefixCell>,
    store: Arc<dyn KvStore>,
    on_update: UpdateCallback,
    observers: Arc<ObserverSet>,
    retry_delay: Duration,
    shutdown: watch::Receiver<bool>,
}

impl PrefixTask {
    async fn run(self) {
        let PrefixTask {
            cell,
            store,
            on_update,
            observers,
            retry_delay,
            mut shutdown,
        } = self;
        let prefix = cell.prefix.as_str();
        let mut consecutive_failures: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let last_index = cell.index.load(Ordering::Acquire);
            observers.on_poll(prefix, last_index);

            // A closed channel means the watcher was dropped.
            let outcome = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                outcome = store.watch_prefix(prefix, last_index) => outcome,
            };

            match outcome {
                Ok(index) => {
                    consecutive_failures = 0;
                    observers.on_success(prefix, index);
                    if let Some(current) = advance(last_index, index) {
                        cell.index.store(current, Ordering::Release);
                        observers.on_change(prefix, last_index, current);

                        // Runs on the blocking pool so a slow callback only holds up this prefix.
                        let callback = Arc::clone(&on_update);
                        let target = Arc::clone(&cell);
                        match tokio::task::spawn_blocking(move || callback(&target.prefix)).await {
                            Ok(()) => {}
                            Err(err) if err.is_panic() => {
                                let message = panic_message(err.into_panic());
                                observers.on_callback_panic(prefix, current, &message);
                            }
                            // Cancelled: the runtime is shutting down.
                            Err(_) => break,
                        }
                    }
                }
                Err(err) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    observers.on_error(prefix, last_index, &err, consecutive_failures);
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(retry_delay) => {}
                    }
                }
            }
        }

        observers.on_stopped(prefix, cell.index.load(Ordering::Acquire));
    }
}

/// Best-effort text of a panic payload.
fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// The index to record after a successful call, if the prefix changed.
fn advance(last_index: u64, observed: u64) -> Option<u64> {
    (observed > last_index).then_some(observed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MemoryStore;
    use proptest::prelude::*;

    fn watcher() -> PrefixWatcher {
        PrefixWatcher::new(Arc::new(MemoryStore::new()), |_| {})
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bad index"))), "bad index");
        assert_eq!(panic_message(Box::new(42u8)), "non-string panic payload");
    }

    #[test]
    fn test_advance_only_on_strict_increase() {
        assert_eq!(advance(0, 5), Some(5));
        assert_eq!(advance(5, 5), None);
        assert_eq!(advance(9, 3), None);
    }

    proptest! {
        #[test]
        fn prop_advance_never_moves_backwards(last in any::<u64>(), observed in any::<u64>()) {
            match advance(last, observed) {
                Some(next) => prop_assert!(next > last && next == observed),
                None => prop_assert!(observed <= last),
            }
        }
    }

    #[test]
    fn test_register_is_idempotent() {
        let watcher = watcher();
        watcher.register("dev/").unwrap();
        watcher.register("dev/").unwrap();
        watcher.register("prod/").unwrap();

        assert_eq!(watcher.prefixes(), vec!["dev/", "prod/"]);
        assert_eq!(watcher.last_index("dev/"), Some(0));
        assert_eq!(watcher.last_index("staging/"), None);
    }

    #[test]
    fn test_start_requires_runtime() {
        let watcher = watcher();
        watcher.register("dev/").unwrap();
        assert!(matches!(watcher.start(), Err(KvError::NoRuntime)));
        assert!(!watcher.is_running());
    }

    #[tokio::test]
    async fn test_register_after_start_is_rejected() {
        let watcher = watcher();
        watcher.register("dev/").unwrap();
        watcher.start().unwrap();

        assert!(watcher.is_running());
        assert!(matches!(watcher.register("prod/"), Err(KvError::AlreadyStarted)));
        assert!(matches!(watcher.start(), Err(KvError::AlreadyStarted)));
        assert_eq!(watcher.prefixes(), vec!["dev/"]);

        watcher.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_terminal() {
        let watcher = watcher();
        watcher.register("dev/").unwrap();
        watcher.start().unwrap();
        watcher.stop().await;

        assert!(!watcher.is_running());
        assert!(matches!(watcher.start(), Err(KvError::AlreadyStarted)));
        assert!(matches!(watcher.register("prod/"), Err(KvError::AlreadyStarted)));

        // Stopping twice is harmless.
        watcher.stop().await;
    }

    #[tokio::test]
    async fn test_stop_before_start_keeps_watcher_usable() {
        let watcher = watcher();
        watcher.stop().await;
        watcher.register("dev/").unwrap();
        watcher.start().unwrap();
        watcher.stop().await;
    }
}
