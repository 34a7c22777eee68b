//! Invalidation Router
//!
//! Turns named intents and domain events into cache purges. Mutation code
//! calls the intent methods directly after a write succeeds; the event
//! listener does the same for events published on the cache.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::SharedCache;
use crate::error::Result;
use crate::invalidation::{DomainEvent, EventKind, InvalidationIntent, PurgeTarget};
use crate::warming::WarmingCoordinator;

/// What a domain event asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventAction {
    /// Drop everything and re-arm warming
    ClearSession,
    Invalidate(Vec<InvalidationIntent>),
}

impl EventAction {
    pub fn for_event(event: &DomainEvent) -> Self {
        use InvalidationIntent::*;

        match event.kind {
            EventKind::LogoutStarted => EventAction::ClearSession,
            EventKind::ProductMutated => match event.product_id() {
                Some(id) => EventAction::Invalidate(vec![ProductById(id.to_string())]),
                None => EventAction::Invalidate(vec![Products, AllProductDetails]),
            },
            EventKind::VendorStatusChanged => {
                EventAction::Invalidate(vec![Products, AllProductDetails])
            }
            EventKind::ConfigChanged => EventAction::Invalidate(vec![Config]),
            EventKind::UserUpdated => {
                EventAction::Invalidate(vec![User(event.user_id().map(str::to_string))])
            }
            EventKind::CategoriesChanged => EventAction::Invalidate(vec![Categories]),
        }
    }
}

// == Invalidation Router ==
#[derive(Debug)]
pub struct InvalidationRouter {
    cache: SharedCache,
    warming: Option<Arc<WarmingCoordinator>>,
}

impl InvalidationRouter {
    pub fn new(cache: SharedCache) -> Self {
        Self {
            cache,
            warming: None,
        }
    }

    /// Resets this coordinator whenever the session is cleared.
    pub fn with_warming(mut self, warming: Arc<WarmingCoordinator>) -> Self {
        self.warming = Some(warming);
        self
    }

    // == Invalidate ==
    /// Purges everything `intent` covers. Returns the number of keys removed.
    pub async fn invalidate(&self, intent: &InvalidationIntent) -> Result<usize> {
        let mut removed = 0;
        for target in intent.targets() {
            removed += match target {
                PurgeTarget::Key(key) => usize::from(self.cache.delete(&key).await),
                PurgeTarget::Pattern(pattern) => self.cache.delete_pattern(&pattern).await?,
            };
        }
        info!("Invalidated {}: {} keys removed", intent, removed);
        Ok(removed)
    }

    pub async fn invalidate_products(&self) -> Result<usize> {
        self.invalidate(&InvalidationIntent::Products).await
    }

    pub async fn invalidate_product_by_id(&self, id: &str) -> Result<usize> {
        self.invalidate(&InvalidationIntent::ProductById(id.to_string()))
            .await
    }

    pub async fn invalidate_all_product_details(&self) -> Result<usize> {
        self.invalidate(&InvalidationIntent::AllProductDetails).await
    }

    pub async fn invalidate_user(&self, id: Option<&str>) -> Result<usize> {
        self.invalidate(&InvalidationIntent::User(id.map(str::to_string)))
            .await
    }

    pub async fn invalidate_config(&self) -> Result<usize> {
        self.invalidate(&InvalidationIntent::Config).await
    }

    /// Logout path: clears both tiers and re-arms warming for the next session.
    pub async fn clear_session(&self) {
        self.cache.clear().await;
        if let Some(warming) = &self.warming {
            warming.reset();
        }
    }

    // == Handle Event ==
    /// Applies the action an event maps to. Returns the number of keys removed
    /// (0 for a session clear).
    pub async fn handle_event(&self, event: &DomainEvent) -> Result<usize> {
        debug!("Handling event {:?}", event.kind);
        match EventAction::for_event(event) {
            EventAction::ClearSession => {
                self.clear_session().await;
                Ok(0)
            }
            EventAction::Invalidate(intents) => {
                let mut removed = 0;
                for intent in &intents {
                    removed += self.invalidate(intent).await?;
                }
                Ok(removed)
            }
        }
    }
}

/// Spawns a task applying every event received on `events` to `router`.
///
/// Failures are logged and never stop the listener. If events were missed
/// because the listener fell behind, catalog data is purged wholesale.
///
/// # Returns
/// A JoinHandle, to be aborted at shutdown.
pub fn spawn_event_listener(
    router: Arc<InvalidationRouter>,
    mut events: broadcast::Receiver<DomainEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Invalidation event listener started");

        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(e) = router.handle_event(&event).await {
                        warn!("Event {:?} could not be applied: {}", event.kind, e);
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("Missed {} invalidation events, purging catalog data", missed);
                    for intent in [
                        InvalidationIntent::Products,
                        InvalidationIntent::AllProductDetails,
                        InvalidationIntent::Categories,
                        InvalidationIntent::Config,
                    ] {
                        if let Err(e) = router.invalidate(&intent).await {
                            warn!("Catch-up invalidation of {} failed: {}", intent, e);
                        }
                    }
                }
                Err(RecvError::Closed) => {
                    info!("Event channel closed, listener stopping");
                    break;
                }
            }
        }
    })
}
