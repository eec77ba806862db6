use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Bounded concurrent cache with least-recently-used eviction and an
/// optional time-to-live.
///
/// Recency is a global tick stamped on every hit, so eviction scans the map
/// for the smallest stamp. Capacities here are small (hundreds to a few
/// thousand) which keeps the scan cheap next to the network calls the
/// cache saves.
///
/// Eviction runs after a new entry is stored, so while inserts of distinct
/// keys are in flight the map can briefly hold more than `capacity` entries.
/// Every insert trims back to the bound before it returns.
pub struct LruCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    capacity: usize,
    ttl: Option<Duration>,
    size_metric: &'static str,
    tick: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    insertions: AtomicU64,
    evictions: AtomicU64,
}

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    last_used: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    /// Values built or stored. For a compute-if-absent cache this is the
    /// number of constructions.
    pub insertions: u64,
    pub evictions: u64,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// `size_metric` names the gauge updated with the entry count.
    pub fn new(capacity: usize, ttl: Option<Duration>, size_metric: &'static str) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
            ttl,
            size_metric,
            tick: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            insertions: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let lookup = self.entries.get(key).map(|entry| {
            if self.is_expired(&entry) {
                None
            } else {
                entry.last_used.store(self.next_tick(), Ordering::Relaxed);
                Some(entry.value.clone())
            }
        });

        // The shard guard is released by now; removing under it would deadlock.
        let found = match lookup {
            Some(Some(value)) => Some(value),
            Some(None) => {
                self.entries.remove_if(key, |_, e| self.is_expired(e));
                None
            }
            None => None,
        };

        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn insert(&self, key: K, value: V) {
        let replaced = self.entries.insert(key.clone(), self.new_entry(value));
        self.insertions.fetch_add(1, Ordering::Relaxed);
        if replaced.is_none() {
            self.enforce_capacity(&key);
        }
        self.report_size();
    }

    /// Returns the cached value for `key` or builds it with `init`.
    ///
    /// `init` runs while the shard lock for `key` is held, so concurrent
    /// first uses of one key build exactly one value. Failures are not
    /// cached.
    pub fn get_or_try_insert_with<E, F>(&self, key: K, init: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let (value, inserted) = match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if self.is_expired(occupied.get()) {
                    let value = init()?;
                    occupied.insert(self.new_entry(value.clone()));
                    self.insertions.fetch_add(1, Ordering::Relaxed);
                    (value, false)
                } else {
                    occupied
                        .get()
                        .last_used
                        .store(self.next_tick(), Ordering::Relaxed);
                    (occupied.get().value.clone(), false)
                }
            }
            Entry::Vacant(vacant) => {
                let value = init()?;
                vacant.insert(self.new_entry(value.clone()));
                self.insertions.fetch_add(1, Ordering::Relaxed);
                (value, true)
            }
        };

        // Only a call that added a key can push the map past capacity.
        if inserted {
            self.enforce_capacity(&key);
        }
        self.report_size();
        Ok(value)
    }

    /// Drops every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        if self.ttl.is_none() {
            return 0;
        }

        let before = self.entries.len();
        self.entries.retain(|_, e| !self.is_expired(e));
        let purged = before.saturating_sub(self.entries.len());
        self.report_size();
        purged
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.report_size();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            insertions: self.insertions.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn new_entry(&self, value: V) -> CacheEntry<V> {
        CacheEntry {
            value,
            inserted_at: Instant::now(),
            last_used: AtomicU64::new(self.next_tick()),
        }
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed)
    }

    fn is_expired(&self, entry: &CacheEntry<V>) -> bool {
        self.ttl
            .is_some_and(|ttl| entry.inserted_at.elapsed() >= ttl)
    }

    // Evicts least recently used entries other than `keep` until the map is
    // within capacity. Must not be called while holding a guard into `entries`.
    fn enforce_capacity(&self, keep: &K) {
        if self.entries.len() <= self.capacity {
            return;
        }

        self.purge_expired();

        while self.entries.len() > self.capacity {
            let victim = self
                .entries
                .iter()
                .filter(|e| e.key() != keep)
                .min_by_key(|e| e.value().last_used.load(Ordering::Relaxed))
                .map(|e| e.key().clone());

            match victim {
                Some(key) => {
                    if self.entries.remove(&key).is_some() {
                        self.evictions.fetch_add(1, Ordering::Relaxed);
                    }
                }
                None => break,
            }
        }
    }

    fn report_size(&self) {
        metrics::gauge!(self.size_metric).set(self.entries.len() as f64);
    }
}

/// Spawns a task purging expired entries every `interval`, independent of
/// request traffic. Abort the handle to stop it.
pub fn spawn_janitor<K, V>(cache: Arc<LruCache<K, V>>, interval: Duration) -> JoinHandle<()>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let purged = cache.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, metric = cache.size_metric, "Purged expired cache entries");
            }
        }
    })
}
