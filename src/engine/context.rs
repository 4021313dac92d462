//! Collaborators of the funding engine, wired once and shared
//!
//! Every operation receives an [`EngineContext`] instead of reaching for
//! process-wide registries. The builder fills gaps with in-memory defaults,
//! which is what tests and single-process callers want.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::EngineConfig;
use crate::destinations::{ChangeDestinationProvider, MemoryDestinationStore};
use crate::errors::{WalletError, WalletResult};
use crate::events::{DraftEvent, EventDispatcher, EventListener};
use crate::locks::{LockService, MemoryLockService};
use crate::reservation::ReservationEngine;
use crate::resolver::{AddressResolver, DestinationResolver};
use crate::storage::{MemoryWalletStorage, WalletStorage};

/// Shared handles used by every engine operation
#[derive(Clone)]
pub struct EngineContext {
    pub storage: Arc<dyn WalletStorage>,
    pub locks: Arc<dyn LockService>,
    pub resolver: Arc<dyn DestinationResolver>,
    pub destinations: Arc<dyn ChangeDestinationProvider>,
    pub events: Arc<Mutex<EventDispatcher>>,
    pub config: EngineConfig,
}

impl EngineContext {
    pub fn builder() -> EngineContextBuilder {
        EngineContextBuilder::default()
    }

    /// Reservation engine bound to this context's storage, locks and events
    pub fn reservations(&self) -> ReservationEngine {
        ReservationEngine::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.locks),
            Arc::clone(&self.events),
            self.config.lock_ttl,
            self.config.lock_wait,
        )
    }

    /// Publish to every registered listener
    pub async fn publish(&self, event: DraftEvent) {
        self.events.lock().await.dispatch(event).await;
    }
}

/// Builder for [`EngineContext`]
#[derive(Default)]
pub struct EngineContextBuilder {
    storage: Option<Arc<dyn WalletStorage>>,
    locks: Option<Arc<dyn LockService>>,
    resolver: Option<Arc<dyn DestinationResolver>>,
    destinations: Option<Arc<dyn ChangeDestinationProvider>>,
    listeners: Vec<Box<dyn EventListener>>,
    config: Option<EngineConfig>,
}

impl EngineContextBuilder {
    pub fn with_storage(mut self, storage: Arc<dyn WalletStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_locks(mut self, locks: Arc<dyn LockService>) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn DestinationResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_destinations(mut self, destinations: Arc<dyn ChangeDestinationProvider>) -> Self {
        self.destinations = Some(destinations);
        self
    }

    pub fn with_listener(mut self, listener: Box<dyn EventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Validate the configuration and register listeners
    pub fn build(self) -> WalletResult<EngineContext> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let mut dispatcher = EventDispatcher::new();
        for listener in self.listeners {
            dispatcher
                .register(listener)
                .map_err(|e| WalletError::InvalidConfiguration(e.to_string()))?;
        }

        let storage: Arc<dyn WalletStorage> = match self.storage {
            Some(storage) => storage,
            None => Arc::new(MemoryWalletStorage::new()),
        };
        let locks: Arc<dyn LockService> = match self.locks {
            Some(locks) => locks,
            None => Arc::new(MemoryLockService::new()),
        };
        let resolver: Arc<dyn DestinationResolver> = match self.resolver {
            Some(resolver) => resolver,
            None => Arc::new(AddressResolver::new()),
        };
        let destinations: Arc<dyn ChangeDestinationProvider> = match self.destinations {
            Some(destinations) => destinations,
            None => Arc::new(MemoryDestinationStore::new()),
        };

        Ok(EngineContext {
            storage,
            locks,
            resolver,
            destinations,
            events: Arc::new(Mutex::new(dispatcher)),
            config,
        })
    }
}
