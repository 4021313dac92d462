//! Scope guard that releases a draft's reservations unless committed

use crate::reservation::engine::ReservationEngine;

/// Releases every reservation of a draft when the build does not finish.
///
/// Call [`ReservationGuard::commit`] once the draft is persisted. On an error
/// path call [`ReservationGuard::release`] to clean up before returning. If
/// the owning future is dropped mid-build, `Drop` spawns the release.
pub struct ReservationGuard {
    engine: ReservationEngine,
    owner_id: String,
    draft_id: String,
    armed: bool,
}

impl ReservationGuard {
    pub fn new(engine: ReservationEngine, owner_id: &str, draft_id: &str) -> Self {
        Self {
            engine,
            owner_id: owner_id.to_string(),
            draft_id: draft_id.to_string(),
            armed: true,
        }
    }

    /// Keep the reservations
    pub fn commit(mut self) {
        self.armed = false;
    }

    /// Release now. Failures are logged, never returned, so the caller's
    /// original error stays intact.
    pub async fn release(mut self) {
        self.armed = false;
        if let Err(e) = self.engine.unreserve(&self.owner_id, &self.draft_id).await {
            tracing::warn!(
                owner = %self.owner_id,
                draft_id = %self.draft_id,
                error = %e,
                "failed to release reservations after error"
            );
        }
    }
}

impl Drop for ReservationGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let engine = self.engine.clone();
        let owner_id = std::mem::take(&mut self.owner_id);
        let draft_id = std::mem::take(&mut self.draft_id);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = engine.unreserve(&owner_id, &draft_id).await {
                    tracing::warn!(owner = %owner_id, draft_id = %draft_id, error = %e, "failed to release abandoned reservations");
                }
            });
        } else {
            tracing::warn!(owner = %owner_id, draft_id = %draft_id, "no runtime to release abandoned reservations");
        }
    }
}
