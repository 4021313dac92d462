//! Per-account reservation locks
//!
//! Reserving UTXOs is a read-select-write sequence over several rows, so it
//! runs under an exclusive lock keyed by owner. Locks carry a TTL so a crashed
//! holder cannot block an account forever, and waiters give up after a bounded
//! wait.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{WalletError, WalletResult};

pub mod memory;

pub use memory::MemoryLockService;

/// Interval between acquisition attempts while waiting
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Lock key guarding reservations of `owner_id`
pub fn reservation_lock_key(owner_id: &str) -> String {
    format!("utxo-reserve-owner-id-{owner_id}")
}

/// A keyed mutual-exclusion service with expiring leases
#[async_trait]
pub trait LockService: Send + Sync {
    /// Try once. Returns the holder token, or `None` while someone else holds `key`.
    async fn acquire(&self, key: &str, ttl: Duration) -> WalletResult<Option<String>>;

    /// Release `key` if `token` still holds it
    async fn release(&self, key: &str, token: &str) -> WalletResult<()>;
}

/// Held lock; released on [`LockGuard::release`] or when dropped
pub struct LockGuard {
    locks: Arc<dyn LockService>,
    key: String,
    token: Option<String>,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release now and report the outcome
    pub async fn release(mut self) -> WalletResult<()> {
        match self.token.take() {
            Some(token) => self.locks.release(&self.key, &token).await,
            None => Ok(()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        let locks = Arc::clone(&self.locks);
        let key = std::mem::take(&mut self.key);
        // Outside a runtime the lease simply expires
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = locks.release(&key, &token).await {
                    tracing::warn!(key = %key, error = %e, "failed to release dropped lock");
                }
            });
        }
    }
}

/// Acquire `key`, polling until `wait` has elapsed
pub async fn wait_acquire(
    locks: &Arc<dyn LockService>,
    key: &str,
    ttl: Duration,
    wait: Duration,
) -> WalletResult<LockGuard> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        if let Some(token) = locks.acquire(key, ttl).await? {
            return Ok(LockGuard {
                locks: Arc::clone(locks),
                key: key.to_string(),
                token: Some(token),
            });
        }
        if tokio::time::Instant::now() >= deadline {
            tracing::warn!(key = %key, wait_ms = wait.as_millis() as u64, "lock wait timed out");
            return Err(WalletError::LockTimeout(key.to_string()));
        }
        tracing::debug!(key = %key, "lock busy, waiting");
        tokio::time::sleep(LOCK_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> Arc<dyn LockService> {
        Arc::new(MemoryLockService::new())
    }

    #[test]
    fn test_key_format() {
        assert_eq!(reservation_lock_key("abc"), "utxo-reserve-owner-id-abc");
    }

    #[tokio::test]
    async fn test_waiter_times_out() {
        let locks = service();
        let _held = wait_acquire(&locks, "k", Duration::from_secs(20), Duration::ZERO)
            .await
            .unwrap();
        let err = wait_acquire(&locks, "k", Duration::from_secs(20), Duration::from_millis(60))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, WalletError::LockTimeout(_)));
    }

    #[tokio::test]
    async fn test_explicit_release_unblocks() {
        let locks = service();
        let guard = wait_acquire(&locks, "k", Duration::from_secs(20), Duration::ZERO)
            .await
            .unwrap();
        guard.release().await.unwrap();
        assert!(wait_acquire(&locks, "k", Duration::from_secs(20), Duration::ZERO)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_drop_releases_in_background() {
        let locks = service();
        {
            let _guard = wait_acquire(&locks, "k", Duration::from_secs(20), Duration::ZERO)
                .await
                .unwrap();
        }
        let again = wait_acquire(&locks, "k", Duration::from_secs(20), Duration::from_secs(1)).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_waiter_gets_lock_after_holder_finishes() {
        let locks = service();
        let guard = wait_acquire(&locks, "k", Duration::from_secs(20), Duration::ZERO)
            .await
            .unwrap();
        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                wait_acquire(&locks, "k", Duration::from_secs(20), Duration::from_secs(2)).await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        guard.release().await.unwrap();
        assert!(waiter.await.unwrap().is_ok());
    }
}
