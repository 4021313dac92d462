//! Process-local lock service

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::errors::WalletResult;
use crate::locks::LockService;
use crate::utils::random_id;

/// Leases kept in a map; expired leases are taken over by the next acquirer
#[derive(Debug, Default)]
pub struct MemoryLockService {
    leases: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryLockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` is currently held by an unexpired lease
    pub async fn is_locked(&self, key: &str) -> bool {
        self.leases
            .lock()
            .await
            .get(key)
            .map(|(_, expires)| *expires > Instant::now())
            .unwrap_or(false)
    }
}

#[async_trait]
impl LockService for MemoryLockService {
    async fn acquire(&self, key: &str, ttl: Duration) -> WalletResult<Option<String>> {
        let mut leases = self.leases.lock().await;
        let now = Instant::now();
        if let Some((_, expires)) = leases.get(key) {
            if *expires > now {
                return Ok(None);
            }
        }
        let token = random_id();
        leases.insert(key.to_string(), (token.clone(), now + ttl));
        Ok(Some(token))
    }

    async fn release(&self, key: &str, token: &str) -> WalletResult<()> {
        let mut leases = self.leases.lock().await;
        // A stale token belongs to a lease that expired and was taken over
        if leases.get(key).map(|(held, _)| held == token).unwrap_or(false) {
            leases.remove(key);
        }
        Ok(())
    }
}
