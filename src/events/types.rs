//! Event type definitions for draft and reservation activity
//!
//! Events are published after the state change they describe has been
//! persisted, so listeners always observe committed state.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::utils::random_id;

/// Shared event metadata present in all events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique identifier for this event
    pub event_id: String,
    /// Timestamp when the event was created
    pub timestamp: SystemTime,
    /// Account the event belongs to
    pub owner_id: String,
    /// Source component that emitted this event
    pub source: String,
}

impl EventMetadata {
    pub fn new(source: &str, owner_id: &str) -> Self {
        Self {
            event_id: random_id(),
            timestamp: SystemTime::now(),
            owner_id: owner_id.to_string(),
            source: source.to_string(),
        }
    }
}

/// Trait for events that can provide their type name
pub trait EventType {
    /// Get the string name of this event type
    fn event_type(&self) -> &'static str;

    /// Get metadata associated with this event
    fn metadata(&self) -> &EventMetadata;
}

/// Something that happened to a draft or its reserved UTXOs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DraftEvent {
    DraftCreated {
        metadata: EventMetadata,
        draft_id: String,
        fee: u64,
        input_count: usize,
        output_count: usize,
    },
    DraftCanceled {
        metadata: EventMetadata,
        draft_id: String,
    },
    DraftExpired {
        metadata: EventMetadata,
        draft_id: String,
    },
    DraftCompleted {
        metadata: EventMetadata,
        draft_id: String,
        tx_id: String,
    },
    UtxosReserved {
        metadata: EventMetadata,
        draft_id: String,
        utxo_ids: Vec<String>,
        satoshis: u64,
    },
    UtxosReleased {
        metadata: EventMetadata,
        draft_id: String,
        count: usize,
    },
}

impl DraftEvent {
    pub fn draft_created(
        owner_id: &str,
        draft_id: &str,
        fee: u64,
        input_count: usize,
        output_count: usize,
    ) -> Self {
        DraftEvent::DraftCreated {
            metadata: EventMetadata::new("draft_builder", owner_id),
            draft_id: draft_id.to_string(),
            fee,
            input_count,
            output_count,
        }
    }

    pub fn draft_canceled(owner_id: &str, draft_id: &str) -> Self {
        DraftEvent::DraftCanceled {
            metadata: EventMetadata::new("draft_lifecycle", owner_id),
            draft_id: draft_id.to_string(),
        }
    }

    pub fn draft_expired(owner_id: &str, draft_id: &str) -> Self {
        DraftEvent::DraftExpired {
            metadata: EventMetadata::new("draft_cleanup", owner_id),
            draft_id: draft_id.to_string(),
        }
    }

    pub fn draft_completed(owner_id: &str, draft_id: &str, tx_id: &str) -> Self {
        DraftEvent::DraftCompleted {
            metadata: EventMetadata::new("draft_lifecycle", owner_id),
            draft_id: draft_id.to_string(),
            tx_id: tx_id.to_string(),
        }
    }

    pub fn utxos_reserved(owner_id: &str, draft_id: &str, utxo_ids: Vec<String>, satoshis: u64) -> Self {
        DraftEvent::UtxosReserved {
            metadata: EventMetadata::new("reservation_engine", owner_id),
            draft_id: draft_id.to_string(),
            utxo_ids,
            satoshis,
        }
    }

    pub fn utxos_released(owner_id: &str, draft_id: &str, count: usize) -> Self {
        DraftEvent::UtxosReleased {
            metadata: EventMetadata::new("reservation_engine", owner_id),
            draft_id: draft_id.to_string(),
            count,
        }
    }

    /// Draft the event refers to
    pub fn draft_id(&self) -> &str {
        match self {
            DraftEvent::DraftCreated { draft_id, .. }
            | DraftEvent::DraftCanceled { draft_id, .. }
            | DraftEvent::DraftExpired { draft_id, .. }
            | DraftEvent::DraftCompleted { draft_id, .. }
            | DraftEvent::UtxosReserved { draft_id, .. }
            | DraftEvent::UtxosReleased { draft_id, .. } => draft_id,
        }
    }
}

impl EventType for DraftEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DraftEvent::DraftCreated { .. } => "DraftCreated",
            DraftEvent::DraftCanceled { .. } => "DraftCanceled",
            DraftEvent::DraftExpired { .. } => "DraftExpired",
            DraftEvent::DraftCompleted { .. } => "DraftCompleted",
            DraftEvent::UtxosReserved { .. } => "UtxosReserved",
            DraftEvent::UtxosReleased { .. } => "UtxosReleased",
        }
    }

    fn metadata(&self) -> &EventMetadata {
        match self {
            DraftEvent::DraftCreated { metadata, .. }
            | DraftEvent::DraftCanceled { metadata, .. }
            | DraftEvent::DraftExpired { metadata, .. }
            | DraftEvent::DraftCompleted { metadata, .. }
            | DraftEvent::UtxosReserved { metadata, .. }
            | DraftEvent::UtxosReleased { metadata, .. } => metadata,
        }
    }
}
