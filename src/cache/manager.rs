// src/cache/manager.rs

// Bounded in-memory cache with TTL expiry and TTL-aware LRU eviction.
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::cache::entry::{CacheEntry, CachedEntry, EntryInfo};
use crate::cache::stats::{CacheStats, DetailedCacheStats};
use crate::cache_event;
use crate::config::CacheConfig;
use crate::error::Result;

/// Measures the size in bytes a value occupies in the cache
pub type SizeFn<V> = Arc<dyn Fn(&V) -> Result<usize> + Send + Sync>;

/// Default size function: length of the value's JSON encoding
pub fn json_size<V: Serialize>(value: &V) -> Result<usize> {
    Ok(serde_json::to_vec(value)?.len())
}

#[derive(Debug)]
struct CacheInner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    stats: CacheStats,
    tick: u64,
}

impl<V> CacheInner<V> {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            stats: CacheStats::default(),
            tick: 0,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    // All removals go through here so total_size and entry_count track the map
    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.stats.total_size -= entry.size;
        self.stats.entry_count = self.entries.len();
        Some(entry)
    }

    fn insert_entry(&mut self, key: String, entry: CacheEntry<V>) {
        self.stats.total_size += entry.size;
        if let Some(previous) = self.entries.insert(key, entry) {
            self.stats.total_size -= previous.size;
        }
        self.stats.entry_count = self.entries.len();
    }

    fn remove_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove_entry(key);
        }
        expired.len()
    }

    fn clear_entries(&mut self) {
        self.entries.clear();
        self.stats.total_size = 0;
        self.stats.entry_count = 0;
    }
}

/// In-memory response cache
///
/// Values are measured once at insertion with the configured size function
/// (JSON length by default). The cache never holds more than `max_entries`
/// entries or more than `max_size` bytes: a `set` that would cross either limit
/// first drops expired entries, then least recently used ones.
///
/// A background task started on construction sweeps expired entries every
/// `cleanup_interval`; call [`CacheManager::stop`] to cancel it.
pub struct CacheManager<V> {
    inner: Arc<RwLock<CacheInner<V>>>,
    config: CacheConfig,
    sizer: SizeFn<V>,
    cancel_flag: Arc<AtomicBool>,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
}

impl<V> std::fmt::Debug for CacheManager<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("CacheManager")
            .field("config", &self.config)
            .field("stats", &guard.stats)
            .field("cancelled", &self.cancel_flag.load(Ordering::SeqCst))
            .finish()
    }
}

impl<V> CacheManager<V>
where
    V: Serialize + Clone + Send + Sync + 'static,
{
    /// Creates a cache that measures values by their JSON encoding
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_sizer(config, Arc::new(|value: &V| json_size(value)))
    }

    /// Creates a cache with a custom size function
    pub fn with_sizer(config: CacheConfig, sizer: SizeFn<V>) -> Result<Self> {
        config.validate()?;

        let inner = Arc::new(RwLock::new(CacheInner::new(config.max_entries.min(10_000))));
        let cancel_flag = Arc::new(AtomicBool::new(false));

        let cleanup_task = if config.use_background_task {
            Self::spawn_cleanup(Arc::clone(&inner), Arc::clone(&cancel_flag), config.cleanup_interval)
        } else {
            None
        };

        info!(
            max_size = config.max_size,
            max_entries = config.max_entries,
            default_ttl_ms = config.default_ttl.as_millis() as u64,
            "Cache manager initialized"
        );

        Ok(Self {
            inner,
            config,
            sizer,
            cancel_flag,
            cleanup_task: Mutex::new(cleanup_task),
        })
    }

    fn spawn_cleanup(
        inner: Arc<RwLock<CacheInner<V>>>,
        cancel_flag: Arc<AtomicBool>,
        interval: Duration,
    ) -> Option<JoinHandle<()>> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No tokio runtime available, cache cleanup task not started");
                return None;
            }
        };

        Some(runtime.spawn(async move {
            let mut interval_timer = time::interval(interval);
            // The first tick completes immediately
            interval_timer.tick().await;

            loop {
                interval_timer.tick().await;

                if cancel_flag.load(Ordering::SeqCst) {
                    break;
                }

                let removed = {
                    let mut guard = inner.write().unwrap_or_else(PoisonError::into_inner);
                    guard.remove_expired(Instant::now())
                };
                if removed > 0 {
                    debug!(removed, "Cache cleanup removed expired entries");
                }
            }

            debug!("Cache cleanup task stopped");
        }))
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheInner<V>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheInner<V>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a value with the default TTL
    pub fn set(&self, key: impl Into<String>, value: V) -> bool {
        self.set_with_ttl(key, value, self.config.default_ttl)
    }

    /// Stores a value with an explicit TTL.
    ///
    /// Returns false when the value cannot be measured or is larger than the
    /// whole cache budget; nothing is stored or evicted in that case.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) -> bool {
        let key = key.into();

        let size = match (self.sizer)(&value) {
            Ok(size) => size,
            Err(e) => {
                error!(key = %key, error = %e, "Failed to serialize cache value");
                return false;
            }
        };

        if size > self.config.max_size {
            warn!(
                key = %key,
                size,
                max_size = self.config.max_size,
                "Cache entry exceeds total cache size, not stored"
            );
            return false;
        }

        let mut guard = self.write();
        let now = Instant::now();
        self.make_room(&mut guard, &key, size, now);

        let tick = guard.next_tick();
        cache_event!("set", key, size);
        guard.insert_entry(key, CacheEntry::new(value, ttl, size, now, tick));
        true
    }

    // Evicts until an entry of `incoming` bytes under `key` fits both limits.
    // The key being written is never a candidate.
    fn make_room(&self, inner: &mut CacheInner<V>, key: &str, incoming: usize, now: Instant) {
        let replaced = inner.entries.get(key).map(|entry| entry.size);
        let mut projected_size = inner.stats.total_size - replaced.unwrap_or(0) + incoming;
        let mut projected_count = inner.entries.len() + usize::from(replaced.is_none());

        let fits = |size: usize, count: usize| {
            size <= self.config.max_size && count <= self.config.max_entries
        };
        if fits(projected_size, projected_count) {
            return;
        }

        let mut candidates: Vec<(String, bool, u64)> = inner
            .entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, entry)| (k.clone(), entry.is_expired(now), entry.access_tick))
            .collect();

        // Expired entries first, then oldest access
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

        let mut evicted = 0u64;
        for (candidate, expired, _) in candidates {
            if !expired && fits(projected_size, projected_count) {
                break;
            }
            if let Some(entry) = inner.remove_entry(&candidate) {
                projected_size -= entry.size;
                projected_count -= 1;
                inner.stats.evictions += 1;
                evicted += 1;
            }
        }

        debug!(
            evicted,
            total_size = inner.stats.total_size,
            entry_count = inner.stats.entry_count,
            "Evicted cache entries to make room"
        );
    }

    /// Looks up a value, counting a hit or a miss
    pub fn get(&self, key: &str) -> Option<V> {
        let mut guard = self.write();
        let inner = &mut *guard;
        let now = Instant::now();

        let expired = match inner.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                inner.stats.record_miss();
                return None;
            }
        };

        if expired {
            inner.remove_entry(key);
            inner.stats.record_miss();
            debug!(key = %key, "Cache entry expired on lookup");
            return None;
        }

        inner.tick += 1;
        let tick = inner.tick;
        let value = inner.entries.get_mut(key).map(|entry| {
            entry.access_count += 1;
            entry.last_accessed = now;
            entry.access_tick = tick;
            entry.value.clone()
        });
        inner.stats.record_hit();
        value
    }

    /// Checks whether a live entry exists without touching hit/miss counters
    pub fn has(&self, key: &str) -> bool {
        let mut guard = self.write();
        let now = Instant::now();

        match guard.entries.get(key).map(|entry| entry.is_expired(now)) {
            Some(false) => true,
            Some(true) => {
                guard.remove_entry(key);
                false
            }
            None => false,
        }
    }

    pub fn delete(&self, key: &str) -> bool {
        let removed = self.write().remove_entry(key).is_some();
        if removed {
            cache_event!("delete", key, 0usize);
        }
        removed
    }

    /// Drops every entry, keeping hit/miss/eviction counters
    pub fn clear(&self) {
        self.write().clear_entries();
        info!("Cache cleared");
    }

    /// Drops every entry and resets all counters
    pub fn clear_all(&self) {
        let mut guard = self.write();
        guard.clear_entries();
        guard.stats = CacheStats::default();
        info!("Cache cleared and stats reset");
    }

    /// Removes expired entries now, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        self.write().remove_expired(Instant::now())
    }

    pub fn get_stats(&self) -> CacheStats {
        self.read().stats.clone()
    }

    pub fn get_detailed_stats(&self) -> DetailedCacheStats {
        let guard = self.read();
        let now = Instant::now();
        let stats = guard.stats.clone();

        let expired_entries = guard
            .entries
            .values()
            .filter(|entry| entry.is_expired(now))
            .count();
        let oldest_entry_age = guard
            .entries
            .values()
            .map(|entry| now.saturating_duration_since(entry.inserted_at))
            .max()
            .unwrap_or_default();
        let average_entry_size = if stats.entry_count == 0 {
            0
        } else {
            stats.total_size / stats.entry_count
        };

        DetailedCacheStats {
            size_usage_percent: stats.total_size as f64 / self.config.max_size as f64 * 100.0,
            entry_usage_percent: stats.entry_count as f64 / self.config.max_entries as f64
                * 100.0,
            stats,
            max_size: self.config.max_size,
            max_entries: self.config.max_entries,
            default_ttl: self.config.default_ttl,
            average_entry_size,
            expired_entries,
            oldest_entry_age,
        }
    }

    pub fn get_entry_info(&self, key: &str) -> Option<EntryInfo> {
        let guard = self.read();
        guard
            .entries
            .get(key)
            .map(|entry| entry.info(key, Instant::now()))
    }

    /// Stored keys in sorted order, including expired ones not yet removed
    pub fn get_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.read().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Copies of every stored entry, sorted by key
    pub fn get_entries(&self) -> Vec<CachedEntry<V>> {
        let guard = self.read();
        let now = Instant::now();
        let mut entries: Vec<CachedEntry<V>> = guard
            .entries
            .iter()
            .map(|(key, entry)| CachedEntry {
                info: entry.info(key, now),
                value: entry.value.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.info.key.cmp(&b.info.key));
        entries
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

impl<V> CacheManager<V> {
    /// Cancels the background cleanup task
    pub fn stop(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
        let handle = self
            .cleanup_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            debug!("Cache cleanup task cancelled");
        }
    }

    pub fn is_running(&self) -> bool {
        self.cleanup_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl<V> Drop for CacheManager<V> {
    fn drop(&mut self) {
        self.stop();
    }
}
