use dashmap::DashMap;
use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::config::MapConfig;
use crate::entry::{saturating_deadline, Entry, ExpiryCallback};
use crate::error::Error;

/// Internal shared state for the map
struct MapInner<K, V> {
    data: DashMap<K, Entry<V>>,
    /// Sender to signal shutdown to the sweeper task
    shutdown_tx: watch::Sender<bool>,
    sweep_interval: Duration,
}

/// Thread-safe in-memory key-value map whose entries expire after a TTL
///
/// Expired entries are evicted in two ways:
///
/// - **Lazily**, by any `get`, `get_expiry`, `contains_key` or `refresh` that
///   touches the key. An expired value is never returned.
/// - **Actively**, by a background sweeper that scans the map every
///   `sweep_interval`, so untouched keys are gone at most one interval after
///   their deadline.
///
/// Whichever path sees the entry first removes it and runs its expiry
/// callbacks, exactly once. Callbacks always run after the map lock for that
/// key has been released. Background sweeps run their callbacks on Tokio's
/// blocking pool, so a slow callback never occupies a runtime worker. Explicit removal (`remove`, `flush`) and overwriting
/// via `set` never run callbacks.
///
/// Cloning the map is cheap and yields another handle to the same entries and
/// sweeper. The sweeper stops when the last handle is dropped, or earlier via
/// [`stop_sweeper`](Self::stop_sweeper).
///
/// # Example
///
/// ```rust,no_run
/// use expiring_map_core::{on_expire, ExpiringMap};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let map = ExpiringMap::new(Duration::from_secs(1));
///
///     map.set_with_callbacks(
///         "hey",
///         213,
///         Duration::from_secs(3),
///         [on_expire(|v: &i32| println!("{v} expired"))],
///     );
///     assert_eq!(map.get("hey"), Some(213));
/// }
/// ```
pub struct ExpiringMap<K, V> {
    inner: Arc<MapInner<K, V>>,
}

impl<K, V> Clone for ExpiringMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> ExpiringMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Creates a new map that sweeps every `sweep_interval`
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context, or if
    /// `sweep_interval` is zero. Use [`try_new`](Self::try_new) to get an
    /// error instead.
    pub fn new(sweep_interval: Duration) -> Self {
        Self::with_config(MapConfig::default().with_sweep_interval(sweep_interval))
    }

    /// Creates a new map with custom configuration
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context, or if the
    /// configuration is invalid.
    pub fn with_config(config: MapConfig) -> Self {
        match Self::try_with_config(config) {
            Ok(map) => map,
            Err(err) => panic!(
                "expiring_map_core::ExpiringMap could not be created: {err}. \
                 Ensure the sweep interval is non-zero and that you are calling \
                 from within a #[tokio::main] or #[tokio::test] context, \
                 or from code running on a Tokio runtime."
            ),
        }
    }

    /// Creates a new map that sweeps every `sweep_interval`
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSweepInterval`] for a zero interval and
    /// [`Error::NoRuntime`] when no Tokio runtime is available.
    pub fn try_new(sweep_interval: Duration) -> Result<Self, Error> {
        Self::try_with_config(MapConfig::default().with_sweep_interval(sweep_interval))
    }

    /// Creates a new map with custom configuration
    ///
    /// # Errors
    ///
    /// See [`try_new`](Self::try_new).
    pub fn try_with_config(config: MapConfig) -> Result<Self, Error> {
        config.validate()?;
        let handle = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(MapInner {
            data: DashMap::new(),
            shutdown_tx,
            sweep_interval: config.sweep_interval,
        });

        // The task only holds a weak handle so dropping the map ends it
        handle.spawn(Self::sweep_task(
            Arc::downgrade(&inner),
            config.sweep_interval,
            shutdown_rx,
        ));

        Ok(Self { inner })
    }

    /// Background task that periodically evicts expired entries
    async fn sweep_task(
        inner: Weak<MapInner<K, V>>,
        interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the first immediate tick - we want to wait for the interval first
        ticker.tick().await;

        tracing::debug!(?interval, "sweeper started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let Some(map) = inner.upgrade() else {
                        break;
                    };
                    // Callbacks may block, so the pass runs on the blocking pool
                    match tokio::task::spawn_blocking(move || Self::sweep_internal(&map)).await {
                        Ok(0) => {}
                        Ok(evicted) => {
                            tracing::debug!(evicted, "sweep evicted expired entries");
                        }
                        Err(err) => {
                            tracing::error!(error = %err, "sweep pass failed");
                        }
                    }
                }
            }
        }

        tracing::debug!("sweeper stopped");
    }

    /// Internal sweep logic (shared between manual and background sweeps)
    fn sweep_internal(inner: &MapInner<K, V>) -> usize {
        let now = Instant::now();

        // Collect first: shard read locks must be released before removing
        let expired: Vec<K> = inner
            .data
            .iter()
            .filter(|entry| entry.value().is_expired_at(now))
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = 0;
        for key in expired {
            // A concurrent set may have replaced the entry since the scan
            if let Some((_, entry)) = inner.data.remove_if(&key, |_, e| e.is_expired_at(now)) {
                entry.expire();
                evicted += 1;
            }
        }

        evicted
    }

    /// Removes the entry for `key` if it is expired, then runs its callbacks.
    ///
    /// `remove_if` checks and removes under the shard lock, so concurrent
    /// evictions of the same entry cannot both succeed.
    fn evict_if_expired<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if let Some((_, entry)) = self.inner.data.remove_if(key, |_, e| e.is_expired()) {
            tracing::trace!("lazily evicted expired entry");
            entry.expire();
        }
    }

    /// Stores a value under `key` that expires after `ttl`
    ///
    /// If the key already exists, the entry is replaced and its callbacks are
    /// discarded without running.
    ///
    /// A zero `ttl` yields an entry that is already expired: it is evicted by
    /// the next access or sweep. TTLs beyond ~100 years are capped.
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        self.set_with_callbacks(key, value, ttl, Vec::new());
    }

    /// Stores a value with callbacks to run, in order, when it expires
    ///
    /// See [`set`](Self::set) for TTL and overwrite semantics.
    pub fn set_with_callbacks<I>(&self, key: K, value: V, ttl: Duration, callbacks: I)
    where
        I: IntoIterator<Item = ExpiryCallback<V>>,
    {
        let expires_at = saturating_deadline(Instant::now(), ttl);
        let entry = Entry::new(value, expires_at, callbacks.into_iter().collect());

        // The replaced entry is dropped here, outside the shard lock
        let _replaced = self.inner.data.insert(key, entry);
    }

    /// Returns the expiration time of `key`
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the key doesn't exist or has expired.
    /// Expired entries are evicted and their callbacks run.
    pub fn get_expiry<Q>(&self, key: &Q) -> Result<Instant, Error>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        {
            let entry = self.inner.data.get(key).ok_or(Error::NotFound)?;
            if !entry.value().is_expired() {
                return Ok(entry.value().expires_at());
            }
        }

        self.evict_if_expired(key);
        Err(Error::NotFound)
    }

    /// Checks if a key exists and is not expired.
    ///
    /// Expired entries are lazily evicted when checked.
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_expiry(key).is_ok()
    }

    /// Deletes a key from the map without running its callbacks
    ///
    /// Returns `true` if the key existed (regardless of expiration), `false` otherwise.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.data.remove(key).is_some()
    }

    /// Pushes the deadline of `key` back by `extension`
    ///
    /// The extension is added to the current deadline, not to the current time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the key doesn't exist or has expired.
    /// Expired entries are evicted and their callbacks run.
    pub fn refresh<Q>(&self, key: &Q, extension: Duration) -> Result<(), Error>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        {
            let mut entry = self.inner.data.get_mut(key).ok_or(Error::NotFound)?;
            if !entry.value().is_expired() {
                entry.value_mut().extend(extension);
                return Ok(());
            }
        }

        self.evict_if_expired(key);
        Err(Error::NotFound)
    }

    /// Deletes all entries without running any callbacks.
    ///
    /// Returns the number of entries that were removed.
    ///
    /// # Note
    ///
    /// Entries are removed key by key and dropped outside the shard lock, so
    /// whatever the callbacks captured may touch the map from its `Drop`.
    /// Entries inserted concurrently with a flush may or may not survive it.
    pub fn flush(&self) -> usize {
        let keys: Vec<K> = self
            .inner
            .data
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        keys.iter()
            .filter(|key| self.inner.data.remove(*key).is_some())
            .count()
    }

    /// Manually evicts all expired entries, running their callbacks
    ///
    /// Returns the number of entries evicted.
    ///
    /// Note: This is also done automatically by the background sweeper.
    pub fn sweep(&self) -> usize {
        Self::sweep_internal(&self.inner)
    }

    /// Returns the number of entries in the map (including expired ones not yet evicted)
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.data.len()
    }

    /// Returns `true` if the map is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.data.is_empty()
    }

    /// Returns all keys that are not expired
    pub fn keys(&self) -> Vec<K> {
        self.inner
            .data
            .iter()
            .filter(|entry| !entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Returns the interval between background sweeps
    pub fn sweep_interval(&self) -> Duration {
        self.inner.sweep_interval
    }

    /// Returns `true` until [`stop_sweeper`](Self::stop_sweeper) has been called
    pub fn is_sweeper_running(&self) -> bool {
        !*self.inner.shutdown_tx.borrow()
    }

    /// Stops the background sweeper for good
    ///
    /// Entries are kept. From now on expired entries are only evicted when
    /// accessed or by a manual [`sweep`](Self::sweep). Calling this more than
    /// once is harmless. A sweep already in progress runs to completion.
    pub fn stop_sweeper(&self) {
        self.inner.shutdown_tx.send_replace(true);
    }
}

impl<K, V> ExpiringMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Retrieves a value by key
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    /// Expired entries are evicted and their callbacks run.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        {
            let entry = self.inner.data.get(key)?;
            if !entry.value().is_expired() {
                return Some(entry.value().value().clone());
            }
        }

        self.evict_if_expired(key);
        None
    }
}

impl<K, V> fmt::Debug for ExpiringMap<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringMap")
            .field("len", &self.inner.data.len())
            .field("sweep_interval", &self.inner.sweep_interval)
            .field("sweeper_running", &!*self.inner.shutdown_tx.borrow())
            .finish()
    }
}

impl<K, V> Drop for MapInner<K, V> {
    fn drop(&mut self) {
        // Signal the sweeper to stop when the map is dropped
        self.shutdown_tx.send_replace(true);
    }
}
