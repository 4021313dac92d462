//! Periodic expiry of abandoned drafts

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::drafts::expire_stale_drafts;
use crate::engine::EngineContext;
use crate::tasks::cancellation::{AtomicCancellationToken, CancellationToken};
use crate::utils::current_timestamp_ms;

/// Expires drafts past their deadline and releases what they reserved
pub struct DraftCleanupTask {
    ctx: EngineContext,
    interval: Duration,
    token: AtomicCancellationToken,
}

impl DraftCleanupTask {
    pub fn new(ctx: EngineContext, token: AtomicCancellationToken) -> Self {
        let interval = ctx.config.cleanup_interval;
        Self {
            ctx,
            interval,
            token,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// One sweep. Returns the number of drafts expired.
    pub async fn run_once(&self) -> usize {
        match expire_stale_drafts(&self.ctx, current_timestamp_ms()).await {
            Ok(0) => 0,
            Ok(expired) => {
                tracing::info!(expired, "expired stale drafts");
                expired
            }
            Err(e) => {
                tracing::warn!(error = %e, "draft cleanup sweep failed");
                0
            }
        }
    }

    /// Sweep on every tick until the token is cancelled
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::debug!(interval_ms = self.interval.as_millis() as u64, "draft cleanup started");

        while !self.token.is_cancelled() {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                _ = self.token.wait_cancelled() => break,
            }
        }
        tracing::debug!("draft cleanup stopped");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
