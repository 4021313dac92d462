//! Listener that writes every event to the `tracing` subscriber

use async_trait::async_trait;

use crate::events::{DraftEvent, EventListener, EventType};

/// Logs each event at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

#[async_trait]
impl EventListener for TracingListener {
    async fn handle_event(
        &mut self,
        event: &DraftEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let owner = &event.metadata().owner_id;
        match event {
            DraftEvent::DraftCreated {
                draft_id,
                fee,
                input_count,
                output_count,
                ..
            } => tracing::info!(
                owner = %owner,
                draft_id = %draft_id,
                fee,
                inputs = input_count,
                outputs = output_count,
                "draft created"
            ),
            DraftEvent::UtxosReserved {
                draft_id,
                utxo_ids,
                satoshis,
                ..
            } => tracing::info!(
                owner = %owner,
                draft_id = %draft_id,
                count = utxo_ids.len(),
                satoshis,
                "utxos reserved"
            ),
            DraftEvent::UtxosReleased { draft_id, count, .. } => {
                tracing::info!(owner = %owner, draft_id = %draft_id, count, "utxos released")
            }
            DraftEvent::DraftCompleted { draft_id, tx_id, .. } => {
                tracing::info!(owner = %owner, draft_id = %draft_id, tx_id = %tx_id, "draft completed")
            }
            other => tracing::info!(
                owner = %owner,
                draft_id = %other.draft_id(),
                event = other.event_type(),
                "draft event"
            ),
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "TracingListener"
    }
}
