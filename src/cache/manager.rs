//! Cache Manager Module
//!
//! Public API over the [`EntryStore`]: read-through `get` with per-key request
//! coalescing, direct set/delete/pattern-delete/clear, on-demand statistics,
//! and the domain-event subscription used by invalidation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::cache::store::validate_key;
use crate::cache::{
    CacheStats, CacheTier, DataClass, EntryStore, FileStorage, KeyPattern, KeyValueStorage,
    MemoryStorage, SharedClock, TtlPolicy,
};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::invalidation::DomainEvent;

/// Result every coalesced caller of one key receives.
type ProduceOutcome = std::result::Result<Value, CacheError>;

type InFlightMap = HashMap<String, (u64, broadcast::Sender<ProduceOutcome>)>;

const EVENT_CHANNEL_CAPACITY: usize = 64;

// == Cache Manager ==
/// Injectable application cache.
///
/// Construct one per process, share it behind an `Arc`, and call
/// [`CacheManager::dispose`] at teardown.
#[derive(Debug)]
pub struct CacheManager {
    store: RwLock<EntryStore>,
    /// Producers currently running, keyed by cache key and tagged with the
    /// generation they started in
    in_flight: Mutex<InFlightMap>,
    ttl_policy: TtlPolicy,
    /// Bumped by every `clear()`
    generation: AtomicU64,
    events: broadcast::Sender<DomainEvent>,
}

enum Role {
    Leader(u64),
    Follower(broadcast::Receiver<ProduceOutcome>),
}

/// Releases a leader's in-flight slot even if its future is dropped midway.
struct InFlightSlot<'a> {
    manager: &'a CacheManager,
    key: &'a str,
    generation: u64,
    armed: bool,
}

impl InFlightSlot<'_> {
    /// Releases the slot and hands `outcome` to every waiting caller.
    fn complete(mut self, outcome: &ProduceOutcome) {
        self.armed = false;
        if let Some(tx) = self.release() {
            // No receivers just means nobody else asked for this key
            let _ = tx.send(outcome.clone());
        }
    }

    /// Removes the slot unless a `clear()` already handed the key to a newer
    /// leader.
    fn release(&self) -> Option<broadcast::Sender<ProduceOutcome>> {
        let mut in_flight = self.manager.lock_in_flight();
        let owned = matches!(
            in_flight.get(self.key),
            Some((generation, _)) if *generation == self.generation
        );
        if owned {
            in_flight.remove(self.key).map(|(_, tx)| tx)
        } else {
            None
        }
    }
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!("Producer for '{}' abandoned before completing", self.key);
            self.release();
        }
    }
}

impl CacheManager {
    // == Constructor ==
    /// Creates a manager that exclusively owns `store`.
    pub fn new(store: EntryStore, ttl_policy: TtlPolicy) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store: RwLock::new(store),
            in_flight: Mutex::new(HashMap::new()),
            ttl_policy,
            generation: AtomicU64::new(0),
            events,
        }
    }

    /// Builds the manager described by `config`.
    ///
    /// A persistent file that cannot be opened is logged and replaced by
    /// process-local storage, so startup never fails on storage.
    pub fn from_config(config: &Config, clock: SharedClock) -> Self {
        let storage: Box<dyn KeyValueStorage> = match &config.persistent_path {
            Some(path) => match FileStorage::open(path, config.persistent_quota_bytes) {
                Ok(storage) => Box::new(storage),
                Err(e) => {
                    warn!(
                        "Cannot open persistent cache at {}, using memory storage: {}",
                        path.display(),
                        e
                    );
                    Box::new(MemoryStorage::with_quota(config.persistent_quota_bytes))
                }
            },
            None => Box::new(MemoryStorage::with_quota(config.persistent_quota_bytes)),
        };

        let store = EntryStore::new(
            storage,
            &config.storage_namespace,
            config.persistent_max_items,
            clock,
        );
        Self::new(store, config.ttl.clone())
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, InFlightMap> {
        // The map is only touched in short non-panicking sections
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // == Get (read-through) ==
    /// Returns the cached value for `key`, or runs `producer`, caches its
    /// result in the memory tier for `ttl`, and returns it.
    ///
    /// Concurrent calls for the same key share one producer run. A producer
    /// error is returned to every waiting caller and nothing is cached.
    pub async fn get<T, F, Fut>(&self, key: &str, ttl: Duration, producer: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let value = self
            .read_through(key, ttl, CacheTier::Memory, producer)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Read-through with the TTL and tier of a data class.
    pub async fn get_for_class<T, F, Fut>(
        &self,
        key: &str,
        class: DataClass,
        producer: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let ttl = self.ttl_policy.ttl_for(class);
        let value = self.read_through(key, ttl, class.tier(), producer).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn read_through<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        tier: CacheTier,
        producer: F,
    ) -> Result<Value>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        validate_key(key)?;
        let mut producer = Some(producer);

        loop {
            if let Some(entry) = self.store.write().await.read(key) {
                debug!("Cache hit: {}", key);
                return Ok(entry.value);
            }

            let role = {
                let mut in_flight = self.lock_in_flight();
                match in_flight.get(key) {
                    Some((_, tx)) => Role::Follower(tx.subscribe()),
                    None => {
                        let generation = self.generation.load(Ordering::SeqCst);
                        let (tx, _) = broadcast::channel(1);
                        in_flight.insert(key.to_string(), (generation, tx));
                        Role::Leader(generation)
                    }
                }
            };

            let mut rx = match role {
                Role::Follower(rx) => rx,
                Role::Leader(generation) => {
                    let slot = InFlightSlot {
                        manager: self,
                        key,
                        generation,
                        armed: true,
                    };
                    let producer = producer.take().ok_or_else(|| {
                        CacheError::Internal(format!("Producer for '{}' already consumed", key))
                    })?;
                    let outcome = self.lead(key, ttl, tier, generation, producer).await;
                    slot.complete(&outcome);
                    return outcome;
                }
            };

            debug!("Waiting on in-flight producer for '{}'", key);
            match rx.recv().await {
                Ok(outcome) => return outcome,
                // Leader was dropped or cleared; try again, possibly as the new leader
                Err(_) => continue,
            }
        }
    }

    /// Runs the producer as the single in-flight caller for `key`.
    ///
    /// The result is stored only if no `clear()` ran since `generation`.
    async fn lead<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        tier: CacheTier,
        generation: u64,
        producer: F,
    ) -> ProduceOutcome
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        // A previous leader may have stored the value after our first look
        if let Some(entry) = self.store.write().await.read(key) {
            return Ok(entry.value);
        }

        debug!("Cache miss: {}, running producer", key);

        let produced = match producer().await {
            Ok(produced) => produced,
            Err(e) => {
                warn!("Producer for '{}' failed: {:#}", key, e);
                return Err(CacheError::Producer {
                    key: key.to_string(),
                    message: format!("{:#}", e),
                });
            }
        };
        let value = serde_json::to_value(produced)?;

        // clear() bumps the generation while holding this lock
        let mut store = self.store.write().await;
        if self.generation.load(Ordering::SeqCst) == generation {
            store.write(key, value.clone(), ttl, tier)?;
        } else {
            debug!("Cache cleared while producing '{}', result not stored", key);
        }
        Ok(value)
    }

    // == Peek ==
    /// Returns the cached value without invoking any producer.
    pub async fn peek(&self, key: &str) -> Option<Value> {
        self.store.write().await.read(key).map(|entry| entry.value)
    }

    // == Set ==
    /// Stores `value` under `key` for `ttl` in `tier`.
    ///
    /// Returns the tier the value actually landed in; a failing persistent
    /// write lands in memory.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        tier: CacheTier,
    ) -> Result<CacheTier> {
        let value = serde_json::to_value(value)?;
        self.store.write().await.write(key, value, ttl, tier)
    }

    /// Stores `value` with the TTL and tier of a data class.
    pub async fn set_for_class<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        class: DataClass,
    ) -> Result<CacheTier> {
        self.set(key, value, self.ttl_policy.ttl_for(class), class.tier())
            .await
    }

    // == Delete ==
    /// Removes `key`. Returns whether it was present.
    pub async fn delete(&self, key: &str) -> bool {
        self.store.write().await.remove(key)
    }

    /// Removes every key matching a glob (`*`) or, without `*`, a prefix.
    ///
    /// Returns the number of keys removed.
    pub async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        let pattern = KeyPattern::parse(pattern)?;
        let removed = self
            .store
            .write()
            .await
            .remove_where(|key| pattern.matches(key));
        debug!("Pattern delete {:?} removed {} keys", pattern, removed);
        Ok(removed)
    }

    // == Clear ==
    /// Empties both tiers. Results of producers still running are returned to
    /// their callers but not stored.
    pub async fn clear(&self) {
        let mut store = self.store.write().await;
        store.clear();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        // Later callers must not wait on a producer from before the clear
        self.lock_in_flight()
            .retain(|_, (started, _)| *started >= generation);
        drop(store);

        info!("Cache cleared (generation {})", generation);
    }

    /// Number of `clear()` calls so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Teardown: drops the memory tier. Persistent entries stay for the next
    /// process.
    pub async fn dispose(&self) {
        self.store.write().await.clear_memory();
        info!("Cache disposed");
    }

    /// Removes expired entries from both tiers; returns how many.
    pub async fn purge_expired(&self) -> usize {
        self.store.write().await.purge_expired()
    }

    // == Stats ==
    /// Computes statistics now.
    pub async fn stats(&self) -> CacheStats {
        let mut stats = self.store.read().await.stats();
        stats.in_flight = self.lock_in_flight().len();
        stats
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttl_policy
    }

    // == Events ==
    /// Subscribes to domain events published through this manager.
    pub fn on_invalidation_event(&self) -> broadcast::Receiver<DomainEvent> {
        self.events.subscribe()
    }

    /// Publishes a domain event; returns how many subscribers received it.
    pub fn publish_event(&self, event: DomainEvent) -> usize {
        match self.events.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                debug!("No subscribers for event {:?}", event.kind);
                0
            }
        }
    }
}

/// Shared handle used by warming, invalidation and the HTTP layer.
pub type SharedCache = Arc<CacheManager>;
