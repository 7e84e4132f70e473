use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::config::CacheConfig;

use super::entry::{CacheEntry, Clock, EntryStamp, SystemClock};
use super::store::{PersistentStore, StoreError};

/// Share of the oldest persistent entries dropped when the store is full.
const QUOTA_EVICTION_FRACTION: f64 = 0.5;

/// Values the cache can hold: cloned out of the memory tier and
/// round-tripped through JSON for the persistent tier.
pub trait CacheValue: Clone + Send + Serialize + DeserializeOwned + 'static {}

impl<T> CacheValue for T where T: Clone + Send + Serialize + DeserializeOwned + 'static {}

/// Bounded, insertion-ordered map. The oldest inserted key goes first when
/// the tier is full; reads do not change the order.
struct MemoryTier<V> {
    entries: HashMap<String, CacheEntry<V>>,
    order: VecDeque<String>,
    capacity: usize,
}

impl<V> MemoryTier<V> {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn get(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    /// Insert or overwrite. A full tier drops its oldest key first, even
    /// when `key` is already present; a surviving key keeps its position.
    /// Returns the evicted key, if any.
    fn insert(&mut self, key: &str, entry: CacheEntry<V>) -> Option<String> {
        if self.capacity == 0 {
            return None;
        }

        let mut evicted = None;
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
                evicted = Some(oldest);
            }
        }

        if let Some(existing) = self.entries.get_mut(key) {
            *existing = entry;
        } else {
            self.order.push_back(key.to_string());
            self.entries.insert(key.to_string(), entry);
        }
        evicted
    }

    fn remove(&mut self, key: &str) -> bool {
        if self.entries.remove(key).is_some() {
            self.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| keep(k.as_str()));
        let entries = &self.entries;
        self.order.retain(|k| entries.contains_key(k));
        before - self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Two-tier cache: a bounded in-memory map in front of a persistent store.
///
/// Reads check memory, then the store (promoting hits into memory). Writes
/// always land in memory and go to the store when small enough. Storage
/// failures never reach the caller; the cache falls back to memory-only.
pub struct TieredCache<V> {
    memory: Mutex<MemoryTier<V>>,
    store: Arc<dyn PersistentStore>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
}

impl<V: CacheValue> TieredCache<V> {
    pub fn new(config: CacheConfig, store: Arc<dyn PersistentStore>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: CacheConfig,
        store: Arc<dyn PersistentStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            memory: Mutex::new(MemoryTier::new(config.max_memory_entries)),
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn memory(&self) -> MutexGuard<'_, MemoryTier<V>> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    /// Return the value for `key` if it was stored less than `max_age` ago.
    pub fn get(&self, key: &str, max_age: Duration) -> Option<V> {
        let now = self.clock.now();

        {
            let mut memory = self.memory();
            if let Some(entry) = memory.get(key) {
                if entry.is_fresh(now, max_age) {
                    debug!(key, "Cache hit (memory)");
                    return Some(entry.data.clone());
                }
                memory.remove(key);
                debug!(key, "Expired memory entry removed");
            }
        }

        let store_key = self.store_key(key);
        let raw = match self.store.get(&store_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "Persistent cache read failed");
                return None;
            }
        };

        let entry: CacheEntry<V> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(key, error = %e, "Dropping unreadable persistent entry");
                self.remove_persisted(&store_key);
                return None;
            }
        };

        if !entry.is_fresh(now, max_age) {
            debug!(key, "Expired persistent entry removed");
            self.remove_persisted(&store_key);
            return None;
        }

        debug!(key, "Cache hit (persistent), promoting to memory");
        let data = entry.data.clone();
        self.insert_memory(key, entry);
        Some(data)
    }

    /// Store `value` under `key`. `None` removes the key instead.
    pub fn set(&self, key: &str, value: Option<V>, ttl: Duration) {
        let Some(data) = value else {
            self.delete(key);
            return;
        };

        let entry = CacheEntry::new(data, self.clock.now(), ttl);
        self.insert_memory(key, entry.clone());
        self.persist(key, &entry);
    }

    /// Store `value` with the configured default TTL.
    pub fn set_default(&self, key: &str, value: Option<V>) {
        self.set(key, value, self.config.default_ttl());
    }

    pub fn delete(&self, key: &str) {
        self.memory().remove(key);
        self.remove_persisted(&self.store_key(key));
    }

    /// Empty the memory tier and every persistent key carrying this cache's
    /// prefix. Other data in the store is left alone.
    pub fn clear(&self) {
        self.memory().clear();
        for store_key in self.owned_store_keys() {
            self.remove_persisted(&store_key);
        }
        debug!("Cache cleared");
    }

    /// Remove every key (in both tiers) for which `matches` returns true.
    /// Returns the number of distinct keys removed.
    pub fn invalidate(&self, matches: impl Fn(&str) -> bool) -> usize {
        let mut removed: Vec<String> = Vec::new();
        {
            let mut memory = self.memory();
            memory.retain(|key| {
                if matches(key) {
                    removed.push(key.to_string());
                    false
                } else {
                    true
                }
            });
        }

        let prefix = self.config.key_prefix.as_str();
        for store_key in self.owned_store_keys() {
            let key = &store_key[prefix.len()..];
            if matches(key) {
                self.remove_persisted(&store_key);
                if !removed.iter().any(|k| k == key) {
                    removed.push(key.to_string());
                }
            }
        }
        removed.len()
    }

    /// Number of entries currently held in memory.
    pub fn len_memory(&self) -> usize {
        self.memory().len()
    }

    fn insert_memory(&self, key: &str, entry: CacheEntry<V>) {
        if let Some(evicted) = self.memory().insert(key, entry) {
            debug!(key = %evicted, "Evicted oldest memory entry");
        }
    }

    /// Write `entry` to the store. When it cannot be stored, any older
    /// persisted value for `key` is removed so it cannot resurface.
    fn persist(&self, key: &str, entry: &CacheEntry<V>) {
        let store_key = self.store_key(key);
        if !self.try_persist(key, &store_key, entry) {
            self.remove_persisted(&store_key);
        }
    }

    fn try_persist(&self, key: &str, store_key: &str, entry: &CacheEntry<V>) -> bool {
        let data_len = match serde_json::to_string(&entry.data) {
            Ok(json) => json.len(),
            Err(e) => {
                warn!(key, error = %e, "Value not serializable, keeping in memory only");
                return false;
            }
        };
        if data_len > self.config.persist_threshold_bytes {
            debug!(key, bytes = data_len, "Value too large to persist, keeping in memory only");
            return false;
        }

        let serialized = match serde_json::to_string(entry) {
            Ok(s) => s,
            Err(e) => {
                warn!(key, error = %e, "Entry not serializable, keeping in memory only");
                return false;
            }
        };

        match self.store.set(store_key, &serialized) {
            Ok(()) => true,
            Err(StoreError::QuotaExceeded { .. }) => {
                self.evict_oldest_persisted(QUOTA_EVICTION_FRACTION);
                match self.store.set(store_key, &serialized) {
                    Ok(()) => true,
                    Err(e) => {
                        debug!(key, error = %e, "Persistent store still full, keeping in memory only");
                        false
                    }
                }
            }
            Err(e) => {
                warn!(key, error = %e, "Persistent cache write failed, keeping in memory only");
                false
            }
        }
    }

    /// Drop the oldest `fraction` (rounded up, at least one) of this cache's
    /// persistent entries, ordered by stored timestamp. Unreadable entries
    /// are dropped as they are found.
    fn evict_oldest_persisted(&self, fraction: f64) {
        let mut stamped = Vec::new();
        for store_key in self.owned_store_keys() {
            let stamp = match self.store.get(&store_key) {
                Ok(Some(raw)) => serde_json::from_str::<EntryStamp>(&raw).ok(),
                Ok(None) => continue,
                Err(e) => {
                    warn!(key = %store_key, error = %e, "Persistent cache read failed during eviction");
                    continue;
                }
            };
            match stamp {
                Some(stamp) => stamped.push((stamp.cached_at, store_key)),
                None => self.remove_persisted(&store_key),
            }
        }

        stamped.sort();
        let to_remove = ((stamped.len() as f64 * fraction).ceil() as usize).max(1);
        let evicted = to_remove.min(stamped.len());
        for (_, store_key) in stamped.into_iter().take(to_remove) {
            self.remove_persisted(&store_key);
        }
        debug!(evicted, "Evicted oldest persistent entries after quota error");
    }

    fn owned_store_keys(&self) -> Vec<String> {
        match self.store.keys() {
            Ok(keys) => keys
                .into_iter()
                .filter(|k| k.starts_with(&self.config.key_prefix))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Could not list persistent cache keys");
                Vec::new()
            }
        }
    }

    fn remove_persisted(&self, store_key: &str) {
        if let Err(e) = self.store.remove(store_key) {
            warn!(key = %store_key, error = %e, "Persistent cache delete failed");
        }
    }
}

#[cfg(test)]
impl<V: CacheValue> TieredCache<V> {
    fn memory_entry(&self, key: &str) -> Option<CacheEntry<V>> {
        self.memory().get(key).cloned()
    }
}
