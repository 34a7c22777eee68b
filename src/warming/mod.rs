//! Warming Module
//!
//! Populates the cache with hot-path data before first use, through the
//! normal read-through path.

mod coordinator;
mod prefetch;

pub use coordinator::{
    WarmFailure, WarmOutcome, WarmReport, WarmState, WarmingCoordinator, MAX_PREFETCHES,
};
pub use prefetch::{essential_prefetches, Prefetch};
