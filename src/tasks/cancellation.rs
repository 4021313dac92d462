//! Cancellation for background tasks
//!
//! The flag is an `AtomicBool` so synchronous code can poll it; a
//! [`Notify`] lets async loops wake up as soon as cancellation is requested.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::Notify;

/// Something a long running task checks to know when to stop
pub trait CancellationToken: Send + Sync + std::fmt::Debug {
    fn is_cancelled(&self) -> bool;

    fn cancel(&self);

    /// Clear the cancellation state; not every token supports it
    fn reset(&self) {}
}

#[derive(Debug, Default)]
struct Shared {
    cancelled: AtomicBool,
    notify: Notify,
}

impl Shared {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Atomic flag shared between a task and whoever stops it
#[derive(Debug, Clone, Default)]
pub struct AtomicCancellationToken {
    shared: Arc<Shared>,
}

impl AtomicCancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that starts out cancelled
    pub fn cancelled() -> Self {
        let token = Self::new();
        token.cancel();
        token
    }

    /// A token and a handle that can cancel it from elsewhere
    pub fn create_pair() -> (Self, CancellationHandle) {
        let token = Self::new();
        let handle = CancellationHandle {
            shared: Arc::clone(&token.shared),
        };
        (token, handle)
    }

    /// Resolves once cancellation is requested
    pub async fn wait_cancelled(&self) {
        self.shared.wait().await
    }
}

impl CancellationToken for AtomicCancellationToken {
    fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    fn cancel(&self) {
        self.shared.cancel();
    }

    fn reset(&self) {
        self.shared.cancelled.store(false, Ordering::SeqCst);
    }
}

/// Cancels the token it was created with
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    shared: Arc<Shared>,
}

impl CancellationHandle {
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }
}
