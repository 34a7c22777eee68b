//! Warming Coordinator
//!
//! Runs the essential prefetches once per cache generation. State moves
//! `Uninitialized -> Warming -> Ready`; a `clear()` on the cache (or an
//! explicit [`WarmingCoordinator::reset`]) makes the next call warm again.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::SharedCache;
use crate::warming::Prefetch;

/// Upper bound on registered prefetches.
pub const MAX_PREFETCHES: usize = 16;

// == Warm State ==
/// Lifecycle of the warm-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WarmState {
    Uninitialized,
    /// A run is in progress; only that run may leave this state
    Warming { run: u64 },
    /// Warm for the given cache generation
    Ready { generation: u64 },
}

/// One prefetch that failed during warming.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarmFailure {
    pub name: String,
    pub error: String,
}

/// What a warming run did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WarmReport {
    pub warmed: Vec<String>,
    pub failed: Vec<WarmFailure>,
    pub duration_ms: u64,
}

/// Result of a `warm_essential_data` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WarmOutcome {
    Completed(WarmReport),
    /// Another call is warming right now
    AlreadyWarming,
    /// Already warm for the current cache generation
    AlreadyWarm,
}

// == Warming Coordinator ==
#[derive(Debug)]
pub struct WarmingCoordinator {
    cache: SharedCache,
    prefetches: Vec<Prefetch>,
    state: Mutex<WarmState>,
    /// Last run id handed out
    runs: AtomicU64,
}

/// Puts the state back to `Uninitialized` if a warming run is dropped midway.
struct WarmingRun<'a> {
    coordinator: &'a WarmingCoordinator,
    run: u64,
    finished: bool,
}

impl WarmingRun<'_> {
    /// Moves `Warming` to `next`, unless a reset let another run take over.
    fn finish(&mut self, next: WarmState) {
        self.finished = true;
        let mut state = self.coordinator.lock_state();
        if *state == (WarmState::Warming { run: self.run }) {
            *state = next;
        } else {
            debug!("Warming run {} superseded, state left as {:?}", self.run, *state);
        }
    }
}

impl Drop for WarmingRun<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.finish(WarmState::Uninitialized);
        }
    }
}

impl WarmingCoordinator {
    /// Creates a coordinator for an ordered prefetch list.
    ///
    /// Later prefetches for an already registered key are dropped, and at most
    /// [`MAX_PREFETCHES`] are kept.
    pub fn new(cache: SharedCache, prefetches: Vec<Prefetch>) -> Self {
        let mut seen = HashSet::new();
        let mut kept = Vec::new();
        for prefetch in prefetches {
            if !seen.insert(prefetch.key.clone()) {
                warn!("Duplicate prefetch for key '{}' ignored", prefetch.key);
                continue;
            }
            if kept.len() == MAX_PREFETCHES {
                warn!("Prefetch '{}' ignored: limit of {} reached", prefetch.name, MAX_PREFETCHES);
                continue;
            }
            kept.push(prefetch);
        }

        Self {
            cache,
            prefetches: kept,
            state: Mutex::new(WarmState::Uninitialized),
            runs: AtomicU64::new(0),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, WarmState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current lifecycle state, with a stale `Ready` reported as `Uninitialized`.
    pub fn state(&self) -> WarmState {
        match *self.lock_state() {
            WarmState::Ready { generation } if generation != self.cache.generation() => {
                WarmState::Uninitialized
            }
            state => state,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state(), WarmState::Ready { .. })
    }

    pub fn prefetches(&self) -> &[Prefetch] {
        &self.prefetches
    }

    /// Forgets that warming happened, so the next call warms again.
    pub fn reset(&self) {
        let mut state = self.lock_state();
        if let WarmState::Warming { run } = *state {
            // That run will not mark itself ready
            debug!("Warming reset while run {} is in progress", run);
        }
        *state = WarmState::Uninitialized;
    }

    // == Warm ==
    /// Runs every prefetch in order through the cache's read-through path.
    ///
    /// A failing prefetch is logged and skipped; the run always ends ready.
    pub async fn warm_essential_data(&self) -> WarmOutcome {
        let (generation, run) = {
            let mut state = self.lock_state();
            let generation = self.cache.generation();
            match *state {
                WarmState::Warming { .. } => {
                    debug!("Warming already in progress");
                    return WarmOutcome::AlreadyWarming;
                }
                WarmState::Ready { generation: warmed } if warmed == generation => {
                    debug!("Cache already warm");
                    return WarmOutcome::AlreadyWarm;
                }
                _ => {}
            }
            let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            *state = WarmState::Warming { run };
            (generation, run)
        };

        let mut run = WarmingRun {
            coordinator: self,
            run,
            finished: false,
        };

        info!("Warming {} essential prefetches", self.prefetches.len());
        let started = Instant::now();
        let mut report = WarmReport::default();

        for prefetch in &self.prefetches {
            let result = self
                .cache
                .get_for_class::<Value, _, _>(&prefetch.key, prefetch.class, || prefetch.produce())
                .await;

            match result {
                Ok(_) => {
                    debug!("Prefetch '{}' warmed {}", prefetch.name, prefetch.key);
                    report.warmed.push(prefetch.name.clone());
                }
                Err(e) => {
                    warn!("Prefetch '{}' failed: {}", prefetch.name, e);
                    report.failed.push(WarmFailure {
                        name: prefetch.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        run.finish(WarmState::Ready { generation });

        info!(
            "Warming finished: {} warmed, {} failed in {}ms",
            report.warmed.len(),
            report.failed.len(),
            report.duration_ms
        );
        WarmOutcome::Completed(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheManager, DataClass, EntryStore, ManualClock, TtlPolicy};
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn test_cache() -> SharedCache {
        let clock = Arc::new(ManualClock::new(0));
        Arc::new(CacheManager::new(
            EntryStore::in_memory(10, clock),
            TtlPolicy::default(),
        ))
    }

    fn counting_prefetch(name: &str, key: &str, calls: Arc<AtomicUsize>) -> Prefetch {
        Prefetch::new(name, key, DataClass::Listings, move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                anyhow::Ok("data")
            }
        })
    }

    #[tokio::test]
    async fn test_warm_runs_each_prefetch_once() {
        let cache = test_cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let coordinator = WarmingCoordinator::new(
            cache.clone(),
            vec![
                counting_prefetch("a", "categories:all", calls.clone()),
                counting_prefetch("b", "products:list:1", calls.clone()),
            ],
        );
        assert_eq!(coordinator.state(), WarmState::Uninitialized);

        let first = coordinator.warm_essential_data().await;
        let second = coordinator.warm_essential_data().await;

        assert!(matches!(first, WarmOutcome::Completed(ref r) if r.warmed.len() == 2));
        assert_eq!(second, WarmOutcome::AlreadyWarm);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(coordinator.is_ready());
        assert!(cache.peek("categories:all").await.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_warm_is_noop() {
        let cache = test_cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let coordinator = WarmingCoordinator::new(
            cache,
            vec![counting_prefetch("a", "config:global", calls.clone())],
        );

        let (first, second) = tokio::join!(
            coordinator.warm_essential_data(),
            coordinator.warm_essential_data()
        );

        assert!(matches!(first, WarmOutcome::Completed(_)));
        assert_eq!(second, WarmOutcome::AlreadyWarming);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clear_rearms_warming() {
        let cache = test_cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let coordinator = WarmingCoordinator::new(
            cache.clone(),
            vec![
                counting_prefetch("a", "categories:all", calls.clone()),
                counting_prefetch("b", "config:global", calls.clone()),
            ],
        );

        coordinator.warm_essential_data().await;
        cache.clear().await;
        assert_eq!(coordinator.state(), WarmState::Uninitialized);

        let outcome = coordinator.warm_essential_data().await;
        assert!(matches!(outcome, WarmOutcome::Completed(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        assert_eq!(coordinator.warm_essential_data().await, WarmOutcome::AlreadyWarm);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_or_block_ready() {
        let cache = test_cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let failing = Prefetch::new("broken", "categories:all", DataClass::Reference, || async {
            Err::<Value, _>(anyhow!("upstream down"))
        });
        let coordinator = WarmingCoordinator::new(
            cache.clone(),
            vec![failing, counting_prefetch("ok", "config:global", calls.clone())],
        );

        match coordinator.warm_essential_data().await {
            WarmOutcome::Completed(report) => {
                assert_eq!(report.warmed, vec!["ok".to_string()]);
                assert_eq!(report.failed.len(), 1);
                assert_eq!(report.failed[0].name, "broken");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(coordinator.is_ready());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reset_rearms_warming() {
        let cache = test_cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let coordinator = WarmingCoordinator::new(
            cache,
            vec![counting_prefetch("a", "config:global", calls.clone())],
        );

        coordinator.warm_essential_data().await;
        coordinator.reset();
        assert_eq!(coordinator.state(), WarmState::Uninitialized);

        // Entry is still cached, so the read-through does not call the producer
        coordinator.warm_essential_data().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(coordinator.is_ready());
    }

    #[tokio::test]
    async fn test_duplicate_keys_deduplicated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let coordinator = WarmingCoordinator::new(
            test_cache(),
            vec![
                counting_prefetch("a", "config:global", calls.clone()),
                counting_prefetch("a-again", "config:global", calls.clone()),
            ],
        );
        assert_eq!(coordinator.prefetches().len(), 1);
    }

    #[tokio::test]
    async fn test_run_superseded_after_reset_cannot_mark_ready() {
        let cache = test_cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let coordinator = {
            let calls = calls.clone();
            Arc::new(WarmingCoordinator::new(
                cache.clone(),
                vec![Prefetch::new("slow", "user:1:cart", DataClass::User, move || {
                    let calls = calls.clone();
                    async move {
                        let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                        let delay = if call == 1 { 40 } else { 150 };
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        anyhow::Ok(format!("run {}", call))
                    }
                })],
            ))
        };

        let first = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.warm_essential_data().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Logout while the first run is still fetching
        cache.clear().await;
        coordinator.reset();

        let second = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.warm_essential_data().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(matches!(first.await.unwrap(), WarmOutcome::Completed(_)));
        assert!(matches!(coordinator.state(), WarmState::Warming { .. }));
        assert_eq!(coordinator.warm_essential_data().await, WarmOutcome::AlreadyWarming);

        match second.await.unwrap() {
            WarmOutcome::Completed(report) => assert_eq!(report.warmed, vec!["slow".to_string()]),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(coordinator.state(), WarmState::Ready { generation: 1 });
        assert_eq!(cache.peek("user:1:cart").await, Some(serde_json::json!("run 2")));
    }

    #[tokio::test]
    async fn test_dropped_run_returns_to_uninitialized() {
        let coordinator = WarmingCoordinator::new(
            test_cache(),
            vec![Prefetch::new("slow", "config:global", DataClass::Reference, || async {
                std::future::pending::<()>().await;
                anyhow::Ok(0)
            })],
        );

        let run = coordinator.warm_essential_data();
        let timed_out = tokio::time::timeout(Duration::from_millis(10), run).await;
        assert!(timed_out.is_err());
        assert_eq!(coordinator.state(), WarmState::Uninitialized);
    }
}
