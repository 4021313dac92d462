//! Background work that runs alongside request handling

pub mod cancellation;
pub mod cleanup;

pub use cancellation::{AtomicCancellationToken, CancellationHandle, CancellationToken};
pub use cleanup::DraftCleanupTask;
