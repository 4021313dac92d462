//! Event system for draft and reservation activity
//!
//! The funding engine publishes a [`DraftEvent`] after every committed state
//! change: drafts created, canceled, expired or completed, and UTXOs reserved
//! or released. Registered [`EventListener`]s receive the events in
//! registration order.
//!
//! # Error isolation
//!
//! A failing listener is logged and counted but never interrupts the
//! operation that published the event or the listeners after it.
//!
//! # Custom Listeners
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use lightweight_beef_wallet::events::{DraftEvent, EventListener};
//!
//! struct CustomListener;
//!
//! #[async_trait]
//! impl EventListener for CustomListener {
//!     async fn handle_event(&mut self, event: &DraftEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!         println!("Received event: {:?}", event);
//!         Ok(())
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "CustomListener"
//!     }
//! }
//! ```

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use thiserror::Error;

pub mod listeners;
pub mod types;

pub use listeners::{MemoryListener, TracingListener};
pub use types::*;

/// Errors that can occur during event dispatcher operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventDispatcherError {
    #[error("Listener with name '{0}' is already registered")]
    DuplicateListener(String),
    #[error("Cannot register listener: maximum of {max} listeners allowed, currently have {current}")]
    TooManyListeners { current: usize, max: usize },
    #[error("Invalid listener name: '{0}'")]
    InvalidListenerName(String),
}

/// Statistics about event processing
#[derive(Debug, Default, Clone)]
pub struct EventStats {
    pub total_events_dispatched: usize,
    pub total_listener_calls: usize,
    pub total_listener_errors: usize,
    pub total_processing_time: Duration,
    pub events_by_type: HashMap<String, usize>,
    pub errors_by_listener: HashMap<String, usize>,
}

/// Trait for handling draft events asynchronously
///
/// Errors returned here are logged by the dispatcher and otherwise ignored.
#[async_trait]
pub trait EventListener: Send + Sync {
    async fn handle_event(
        &mut self,
        event: &DraftEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Name used for registration and logging; must be unique per dispatcher
    fn name(&self) -> &'static str {
        "UnnamedListener"
    }

    /// Optional: Check if this listener should receive this event
    fn wants_event(&self, _event: &DraftEvent) -> bool {
        true
    }
}

/// Delivers events to registered listeners
pub struct EventDispatcher {
    listeners: Vec<Box<dyn EventListener>>,
    registered_names: HashSet<String>,
    max_listeners: Option<usize>,
    stats: EventStats,
}

impl EventDispatcher {
    /// Create a new event dispatcher
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            registered_names: HashSet::new(),
            max_listeners: None,
            stats: EventStats::default(),
        }
    }

    /// Create a new event dispatcher with a maximum listener limit
    pub fn new_with_limit(max_listeners: usize) -> Self {
        Self {
            max_listeners: Some(max_listeners),
            ..Self::new()
        }
    }

    /// Register an event listener
    ///
    /// Listeners are called in the order they are registered.
    pub fn register(
        &mut self,
        listener: Box<dyn EventListener>,
    ) -> Result<(), EventDispatcherError> {
        let listener_name = listener.name().to_string();

        if listener_name.trim().is_empty() {
            return Err(EventDispatcherError::InvalidListenerName(listener_name));
        }
        if self.registered_names.contains(&listener_name) {
            return Err(EventDispatcherError::DuplicateListener(listener_name));
        }
        if let Some(max) = self.max_listeners {
            if self.listeners.len() >= max {
                return Err(EventDispatcherError::TooManyListeners {
                    current: self.listeners.len(),
                    max,
                });
            }
        }

        tracing::debug!(listener = %listener_name, "registering event listener");
        self.registered_names.insert(listener_name);
        self.listeners.push(listener);
        Ok(())
    }

    /// Dispatch an event to all registered listeners
    pub async fn dispatch(&mut self, event: DraftEvent) {
        let dispatch_start = Instant::now();
        let event_type = event.event_type();

        self.stats.total_events_dispatched += 1;
        *self
            .stats
            .events_by_type
            .entry(event_type.to_string())
            .or_insert(0) += 1;

        for listener in &mut self.listeners {
            if !listener.wants_event(&event) {
                continue;
            }
            self.stats.total_listener_calls += 1;

            if let Err(e) = listener.handle_event(&event).await {
                let listener_name = listener.name();
                self.stats.total_listener_errors += 1;
                *self
                    .stats
                    .errors_by_listener
                    .entry(listener_name.to_string())
                    .or_insert(0) += 1;
                tracing::warn!(
                    listener = listener_name,
                    event = event_type,
                    error = %e,
                    "event listener failed"
                );
            }
        }

        self.stats.total_processing_time += dispatch_start.elapsed();
    }

    /// Get the number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Get event processing statistics
    pub fn get_stats(&self) -> EventStats {
        self.stats.clone()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
