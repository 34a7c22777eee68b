//! Cache Module
//!
//! Two-tier application cache: a memory tier and a bounded persistent tier,
//! with read-through access, request coalescing and pattern invalidation.

mod clock;
mod entry;
mod expiry;
pub mod keys;
mod manager;
mod pattern;
mod stats;
mod storage;
mod store;


// Re-export public types
pub use clock::{current_timestamp_ms, Clock, ManualClock, SharedClock, SystemClock};
pub use entry::{CacheEntry, CacheTier};
pub use expiry::ExpiryIndex;
pub use keys::{DataClass, TtlPolicy};
pub use manager::{CacheManager, SharedCache};
pub use pattern::KeyPattern;
pub use stats::CacheStats;
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageError, StorageResult};
pub use store::EntryStore;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
