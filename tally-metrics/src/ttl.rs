use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

use hashbrown::HashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Expiry settings of a [`TtlMap`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TtlConfig {
    /// Interval in seconds at which expired entries are physically removed.
    ///
    /// A value of `0` disables the background sweep. Expired entries are still invisible, but
    /// only removed when they are overwritten.
    ///
    /// Defaults to `1800` seconds.
    pub sweep_interval: u64,

    /// Time in seconds after which an entry that has not been written expires.
    ///
    /// Defaults to `3600` seconds.
    pub max_age: u64,
}

impl TtlConfig {
    /// Returns the sweep interval as a [`Duration`].
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }

    /// Returns the maximum age as a [`Duration`].
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age)
    }
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            sweep_interval: 1800,
            max_age: 3600,
        }
    }
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    touched: Instant,
}

/// A map whose entries expire when they are not written for a while.
///
/// Expiry is lazy: expired entries become invisible immediately, but are only removed from memory
/// by [`sweep`](Self::sweep), which can be run periodically with
/// [`spawn_sweeper`](Self::spawn_sweeper).
///
/// All operations are safe to call concurrently. Each operation holds the internal lock for its
/// own duration only.
#[derive(Debug)]
pub struct TtlMap<K, V> {
    max_age: Duration,
    sweep_interval: Duration,
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K, V> TtlMap<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty map with the given expiry settings.
    pub fn new(config: &TtlConfig) -> Self {
        Self {
            max_age: config.max_age(),
            sweep_interval: config.sweep_interval(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn is_expired(&self, entry: &Entry<V>, now: Instant) -> bool {
        now.saturating_duration_since(entry.touched) > self.max_age
    }

    /// Returns a copy of the live value for `key`.
    ///
    /// Returns `None` if the key was never written, was removed, or has expired.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let now = Instant::now();
        let entries = self.entries.lock();

        entries
            .get(key)
            .filter(|entry| !self.is_expired(entry, now))
            .map(|entry| entry.value.clone())
    }

    /// Inserts or replaces the value for `key` and resets its expiry.
    pub fn put(&self, key: K, value: V) {
        let touched = Instant::now();
        self.entries.lock().insert(key, Entry { value, touched });
    }

    /// Removes the entry for `key` and returns its value if it was still live.
    pub fn remove(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let entry = self.entries.lock().remove(key)?;
        (!self.is_expired(&entry, now)).then_some(entry.value)
    }

    /// Reads and conditionally replaces the value for `key` under a single lock acquisition.
    ///
    /// The closure receives the live value, or `None` if there is no live value. If it returns a
    /// new value, that value is stored and its expiry is reset. Otherwise the entry is left
    /// untouched and keeps its previous expiry.
    pub fn update<F, R>(&self, key: &K, f: F) -> R
    where
        F: FnOnce(Option<&V>) -> (Option<V>, R),
    {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let current = entries
            .get(key)
            .filter(|entry| !self.is_expired(entry, now))
            .map(|entry| &entry.value);

        let (replacement, result) = f(current);

        if let Some(value) = replacement {
            let entry = Entry {
                value,
                touched: now,
            };

            match entries.get_mut(key) {
                Some(existing) => *existing = entry,
                None => {
                    entries.insert(key.clone(), entry);
                }
            }
        }

        result
    }

    /// Returns the number of stored entries, including expired entries that were not swept yet.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if there are no stored entries.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Removes all expired entries and returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry, now));
        before - entries.len()
    }

    /// Runs [`sweep`](Self::sweep) periodically on the current tokio runtime.
    ///
    /// The sweeper runs until the returned handle is shut down or dropped, or until the map itself
    /// is dropped. Returns `None` if the sweep interval is zero.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>, name: &'static str) -> Option<SweepHandle>
    where
        K: Send + 'static,
        V: Send + 'static,
    {
        if self.sweep_interval.is_zero() {
            return None;
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join = tokio::spawn(sweep_loop(
            Arc::downgrade(self),
            self.sweep_interval,
            name,
            shutdown_rx,
        ));

        Some(SweepHandle {
            shutdown: shutdown_tx,
            join,
        })
    }
}

async fn sweep_loop<K, V>(
    map: Weak<TtlMap<K, V>>,
    period: Duration,
    name: &'static str,
    mut shutdown: oneshot::Receiver<()>,
) where
    K: Eq + Hash + Clone,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let Some(map) = map.upgrade() else {
                    break;
                };

                let removed = map.sweep();
                if removed > 0 {
                    tally_log::debug!(store = name, removed, "swept expired entries");
                }
            }
        }
    }

    tally_log::trace!(store = name, "sweeper stopped");
}

/// Owns a background sweeper spawned by [`TtlMap::spawn_sweeper`].
///
/// Dropping the handle stops the sweeper at its next wakeup. Use [`shutdown`](Self::shutdown) to
/// wait until it has stopped.
#[derive(Debug)]
pub struct SweepHandle {
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl SweepHandle {
    /// Stops the sweeper and waits for it to finish.
    pub async fn shutdown(self) {
        let Self { shutdown, join } = self;

        // The sweeper may already be gone if its map was dropped.
        shutdown.send(()).ok();

        if let Err(error) = join.await {
            if error.is_panic() {
                tally_log::error!("sweeper panicked during shutdown");
            }
        }
    }
}
