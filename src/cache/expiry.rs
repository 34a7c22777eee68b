//! Expiry Index Module
//!
//! Orders persistent-tier keys for bound enforcement: the entry expiring
//! soonest goes first, and entries expiring at the same instant leave in the
//! order they were written.

use std::collections::{BTreeSet, HashMap};

// == Expiry Index ==
/// Tracks `(expires_at, seq)` per key.
///
/// The set is ordered front = evict first, back = evict last.
#[derive(Debug, Default)]
pub struct ExpiryIndex {
    order: BTreeSet<(u64, u64, String)>,
    positions: HashMap<String, (u64, u64)>,
}

impl ExpiryIndex {
    // == Constructor ==
    /// Creates a new empty index.
    pub fn new() -> Self {
        Self::default()
    }

    // == Track ==
    /// Records (or re-records) a key's expiry and write sequence.
    pub fn track(&mut self, key: &str, expires_at: u64, seq: u64) {
        self.remove(key);
        self.order.insert((expires_at, seq, key.to_string()));
        self.positions.insert(key.to_string(), (expires_at, seq));
    }

    // == Remove ==
    /// Stops tracking a key. Unknown keys are ignored.
    pub fn remove(&mut self, key: &str) {
        if let Some((expires_at, seq)) = self.positions.remove(key) {
            self.order.remove(&(expires_at, seq, key.to_string()));
        }
    }

    // == Pop Next ==
    /// Removes and returns the next key to evict.
    pub fn pop_next(&mut self) -> Option<String> {
        let (_, _, key) = self.order.pop_first()?;
        self.positions.remove(&key);
        Some(key)
    }

    /// Keys whose expiry is at or before `now_ms`.
    pub fn expired(&self, now_ms: u64) -> Vec<String> {
        self.order
            .iter()
            .take_while(|(expires_at, _, _)| *expires_at <= now_ms)
            .map(|(_, _, key)| key.clone())
            .collect()
    }

    /// Tracked keys in eviction order.
    pub fn keys(&self) -> Vec<String> {
        self.order.iter().map(|(_, _, key)| key.clone()).collect()
    }

    /// Highest write sequence seen, used to resume numbering after a reload.
    pub fn max_seq(&self) -> u64 {
        self.positions.values().map(|(_, seq)| *seq).max().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.positions.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.positions.clear();
    }
}
