//! Invalidation Module
//!
//! Named invalidation intents, the domain events that trigger them, and the
//! router that applies both to the cache.

mod events;
mod intents;
mod router;

pub use events::{DomainEvent, EventKind};
pub use intents::{InvalidationIntent, PurgeTarget};
pub use router::{spawn_event_listener, EventAction, InvalidationRouter};
