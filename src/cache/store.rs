//! Entry Store Module
//!
//! Low-level mapping from key to entry over two tiers: a volatile memory map
//! and a bounded persistent tier backed by a [`KeyValueStorage`]. Expired
//! entries are never returned and are removed when touched.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{
    CacheEntry, CacheStats, CacheTier, ExpiryIndex, KeyValueStorage, MemoryStorage, SharedClock,
    StorageError, MAX_KEY_LENGTH,
};
use crate::error::{CacheError, Result};

// == Persistent Tier ==
/// Namespaced, item-bounded view over a storage backend.
#[derive(Debug)]
struct PersistentTier {
    storage: Box<dyn KeyValueStorage>,
    /// Prefix (with trailing `:`) every stored item carries
    namespace: String,
    max_items: usize,
    index: ExpiryIndex,
}

impl PersistentTier {
    /// Wraps `storage`, rebuilding the expiry index from what it already holds.
    fn open(storage: Box<dyn KeyValueStorage>, namespace: &str, max_items: usize) -> Self {
        let mut tier = Self {
            storage,
            namespace: format!("{}:", namespace),
            max_items,
            index: ExpiryIndex::new(),
        };

        let keys = match tier.storage.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Persistent tier unreadable, starting empty: {}", e);
                Vec::new()
            }
        };

        for storage_key in keys {
            let Some(key) = storage_key.strip_prefix(&tier.namespace).map(str::to_string) else {
                continue;
            };
            match tier.load(&key) {
                Ok(Some(entry)) => tier.index.track(&key, entry.expires_at, entry.seq),
                Ok(None) => {}
                Err(e) => {
                    warn!("Dropping unreadable persistent entry '{}': {}", key, e);
                    tier.discard(&key);
                }
            }
        }
        tier
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    fn load(&self, key: &str) -> std::result::Result<Option<CacheEntry>, StorageError> {
        match self.storage.get_item(&self.storage_key(key))? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn save(&mut self, entry: &CacheEntry) -> std::result::Result<(), StorageError> {
        let raw = serde_json::to_string(entry)?;
        let storage_key = self.storage_key(&entry.key);
        self.storage.set_item(&storage_key, &raw)?;
        self.index.track(&entry.key, entry.expires_at, entry.seq);
        Ok(())
    }

    /// Removes a key from index and storage; storage failures are logged.
    fn discard(&mut self, key: &str) -> bool {
        let tracked = self.index.contains(key);
        self.index.remove(key);
        let storage_key = self.storage_key(key);
        if let Err(e) = self.storage.remove_item(&storage_key) {
            warn!("Failed to remove persistent entry '{}': {}", key, e);
        }
        tracked
    }

    /// Evicts soonest-expiring entries until the bound holds.
    fn enforce_bound(&mut self) -> usize {
        let mut evicted = 0;
        while self.index.len() > self.max_items {
            let Some(key) = self.index.pop_next() else {
                break;
            };
            debug!("Evicting persistent entry '{}' to stay within bound", key);
            self.discard(&key);
            evicted += 1;
        }
        evicted
    }

    fn live_count(&self, now_ms: u64) -> usize {
        self.index.len() - self.index.expired(now_ms).len()
    }

    fn tracked_keys(&self) -> Vec<String> {
        self.index.keys()
    }

    /// Removes every item under this namespace, indexed or not.
    fn clear(&mut self) {
        let stored: Vec<String> = match self.storage.keys() {
            Ok(keys) => keys
                .into_iter()
                .filter(|k| k.starts_with(&self.namespace))
                .collect(),
            Err(e) => {
                warn!("Failed to list persistent entries during clear: {}", e);
                self.tracked_keys()
                    .iter()
                    .map(|k| self.storage_key(k))
                    .collect()
            }
        };
        for storage_key in stored {
            if let Err(e) = self.storage.remove_item(&storage_key) {
                warn!("Failed to remove '{}' during clear: {}", storage_key, e);
            }
        }
        self.index.clear();
    }
}

// == Entry Store ==
/// Two-tier entry storage.
#[derive(Debug)]
pub struct EntryStore {
    memory: HashMap<String, CacheEntry>,
    persistent: PersistentTier,
    clock: SharedClock,
    stats: CacheStats,
    next_seq: u64,
}

impl EntryStore {
    // == Constructor ==
    /// Creates a store over the given persistent backend.
    ///
    /// # Arguments
    /// * `storage` - Backend for the persistent tier
    /// * `namespace` - Versioned prefix for persistent items
    /// * `max_items` - Persistent tier bound
    /// * `clock` - Time source for TTL checks
    pub fn new(
        storage: Box<dyn KeyValueStorage>,
        namespace: &str,
        max_items: usize,
        clock: SharedClock,
    ) -> Self {
        let persistent = PersistentTier::open(storage, namespace, max_items);
        let next_seq = persistent.index.max_seq() + 1;
        Self {
            memory: HashMap::new(),
            persistent,
            clock,
            stats: CacheStats::new(),
            next_seq,
        }
    }

    /// Store whose persistent tier lives in process memory.
    pub fn in_memory(max_items: usize, clock: SharedClock) -> Self {
        Self::new(Box::new(MemoryStorage::new()), "cache", max_items, clock)
    }

    // == Read ==
    /// Returns the live entry for `key`, checking memory first.
    ///
    /// An expired entry is deleted and reported as absent. A persistent item
    /// that cannot be read is logged, dropped and reported as absent.
    pub fn read(&mut self, key: &str) -> Option<CacheEntry> {
        let now = self.clock.now_ms();

        if let Some(entry) = self.memory.get(key) {
            if !entry.is_expired_at(now) {
                let entry = entry.clone();
                self.stats.record_hit();
                return Some(entry);
            }
            self.memory.remove(key);
            self.stats.record_expirations(1);
        }

        if self.persistent.index.contains(key) {
            match self.persistent.load(key) {
                Ok(Some(entry)) if !entry.is_expired_at(now) => {
                    self.stats.record_hit();
                    return Some(entry);
                }
                Ok(Some(_)) => {
                    self.persistent.discard(key);
                    self.stats.record_expirations(1);
                }
                Ok(None) => {
                    self.persistent.index.remove(key);
                }
                Err(e) => {
                    warn!("Persistent read of '{}' failed, treating as absent: {}", key, e);
                    self.persistent.discard(key);
                }
            }
        }

        self.stats.record_miss();
        None
    }

    // == Write ==
    /// Creates or replaces `key` in the requested tier.
    ///
    /// A persistent write that the backend rejects is degraded to a memory
    /// write with a warning. Returns the tier the entry actually landed in.
    pub fn write(
        &mut self,
        key: &str,
        value: Value,
        ttl: Duration,
        tier: CacheTier,
    ) -> Result<CacheTier> {
        validate_key(key)?;

        let mut entry = CacheEntry::new(key.to_string(), value, self.clock.now_ms(), ttl, tier);
        entry.seq = self.next_seq;
        self.next_seq += 1;

        match tier {
            CacheTier::Memory => {
                if self.persistent.index.contains(key) {
                    self.persistent.discard(key);
                }
                self.memory.insert(key.to_string(), entry);
                Ok(CacheTier::Memory)
            }
            CacheTier::Persistent => match self.persistent.save(&entry) {
                Ok(()) => {
                    self.memory.remove(key);
                    let evicted = self.persistent.enforce_bound();
                    for _ in 0..evicted {
                        self.stats.record_eviction();
                    }
                    Ok(CacheTier::Persistent)
                }
                Err(e) => {
                    warn!(
                        "Persistent write of '{}' failed, keeping it in memory only: {}",
                        key, e
                    );
                    // An older persistent copy must not outlive this write
                    if self.persistent.index.contains(key) {
                        self.persistent.discard(key);
                    }
                    entry.tier = CacheTier::Memory;
                    self.memory.insert(key.to_string(), entry);
                    self.stats.record_degraded_write();
                    Ok(CacheTier::Memory)
                }
            },
        }
    }

    // == Remove ==
    /// Removes `key` from both tiers. Returns whether anything was there.
    pub fn remove(&mut self, key: &str) -> bool {
        let in_memory = self.memory.remove(key).is_some();
        let in_persistent = self.persistent.index.contains(key) && self.persistent.discard(key);
        in_memory || in_persistent
    }

    // == Remove Where ==
    /// Removes every key in either tier matching `predicate`.
    ///
    /// Returns the number of distinct keys removed.
    pub fn remove_where<F>(&mut self, predicate: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let mut doomed: Vec<String> = self
            .memory
            .keys()
            .filter(|k| predicate(k))
            .cloned()
            .collect();
        doomed.extend(
            self.persistent
                .tracked_keys()
                .into_iter()
                .filter(|k| predicate(k)),
        );
        doomed.sort();
        doomed.dedup();

        doomed.iter().filter(|key| self.remove(key)).count()
    }

    // == Clear ==
    /// Empties both tiers.
    pub fn clear(&mut self) {
        self.memory.clear();
        self.persistent.clear();
    }

    /// Empties only the memory tier, as a process exit would.
    pub fn clear_memory(&mut self) {
        self.memory.clear();
    }

    // == Purge Expired ==
    /// Removes all expired entries from both tiers.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now_ms();

        let before = self.memory.len();
        self.memory.retain(|_, entry| !entry.is_expired_at(now));
        let mut removed = before - self.memory.len();

        for key in self.persistent.index.expired(now) {
            self.persistent.discard(&key);
            removed += 1;
        }

        self.stats.record_expirations(removed);
        removed
    }

    // == Stats ==
    /// Counters plus live entry counts per tier.
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now_ms();
        let mut stats = self.stats.clone();
        stats.memory_entries = self
            .memory
            .values()
            .filter(|entry| !entry.is_expired_at(now))
            .count();
        stats.persistent_entries = self.persistent.live_count(now);
        stats
    }

    // == Length ==
    /// Stored entries across both tiers, expired or not.
    pub fn len(&self) -> usize {
        self.memory.len() + self.persistent.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidRequest("Key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidRequest(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}
