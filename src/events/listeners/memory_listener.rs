//! Listener that keeps every received event in memory
//!
//! Mainly for tests: register it, keep the handle from [`MemoryListener::events`]
//! and assert on what was published.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::events::{DraftEvent, EventListener, EventType};

/// Captures events into a shared vector
#[derive(Debug, Clone, Default)]
pub struct MemoryListener {
    events: Arc<Mutex<Vec<DraftEvent>>>,
    capture_only: Option<Vec<&'static str>>,
}

impl MemoryListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only capture the named event types
    pub fn capture_only(types: Vec<&'static str>) -> Self {
        Self {
            events: Arc::default(),
            capture_only: Some(types),
        }
    }

    /// Shared handle to the captured events
    pub fn events(&self) -> Arc<Mutex<Vec<DraftEvent>>> {
        Arc::clone(&self.events)
    }

    /// Event type names in arrival order
    pub async fn event_types(&self) -> Vec<&'static str> {
        self.events.lock().await.iter().map(|e| e.event_type()).collect()
    }
}

#[async_trait]
impl EventListener for MemoryListener {
    async fn handle_event(
        &mut self,
        event: &DraftEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "MemoryListener"
    }

    fn wants_event(&self, event: &DraftEvent) -> bool {
        self.capture_only
            .as_ref()
            .map(|types| types.contains(&event.event_type()))
            .unwrap_or(true)
    }
}
