//! In-memory storage backend
//!
//! Keeps everything in hash maps behind mutexes. Useful for tests and for
//! callers that manage persistence themselves. Failure modes can be injected
//! to exercise the engine's cleanup paths.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::data_structures::{
    draft_transaction::DraftTransaction, recorded_transaction::RecordedTransaction, utxo::Utxo,
};
use crate::errors::{WalletError, WalletResult};
use crate::storage::storage_trait::{DraftQuery, UtxoQuery, WalletStorage};

/// Injectable failures; each one fires once and then resets
#[derive(Debug, Clone, Default)]
pub struct MemoryFailureModes {
    /// Fail the next save_draft call
    pub fail_save_draft: bool,
    /// Fail the next save_transaction call
    pub fail_save_transaction: bool,
    /// Let this many save_utxo calls succeed, then fail the next one
    pub fail_save_utxo_after: Option<usize>,
    /// Fail the next get operation
    pub fail_get_operations: bool,
}

/// Storage backed by process memory
#[derive(Clone, Default)]
pub struct MemoryWalletStorage {
    utxos: Arc<Mutex<HashMap<String, Utxo>>>,
    transactions: Arc<Mutex<HashMap<String, RecordedTransaction>>>,
    drafts: Arc<Mutex<HashMap<String, DraftTransaction>>>,
    failure_modes: Arc<Mutex<MemoryFailureModes>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryWalletStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the store to empty state
    pub fn reset(&self) {
        lock(&self.utxos).clear();
        lock(&self.transactions).clear();
        lock(&self.drafts).clear();
        *lock(&self.failure_modes) = MemoryFailureModes::default();
    }

    /// Set failure mode for testing error conditions
    pub fn set_failure_mode(&self, mode: MemoryFailureModes) {
        *lock(&self.failure_modes) = mode;
    }

    /// Get the current failure modes
    pub fn get_failure_modes(&self) -> MemoryFailureModes {
        lock(&self.failure_modes).clone()
    }

    /// Number of stored UTXOs
    pub fn utxo_count(&self) -> usize {
        lock(&self.utxos).len()
    }

    /// Check if an operation should fail and return the appropriate error
    fn check_failure(&self, operation: &str) -> WalletResult<()> {
        let mut modes = lock(&self.failure_modes);
        match operation {
            "save_draft" if modes.fail_save_draft => {
                modes.fail_save_draft = false;
                Err(WalletError::StorageError(
                    "injected failure: save_draft".to_string(),
                ))
            }
            "save_transaction" if modes.fail_save_transaction => {
                modes.fail_save_transaction = false;
                Err(WalletError::StorageError(
                    "injected failure: save_transaction".to_string(),
                ))
            }
            "save_utxo" => match modes.fail_save_utxo_after {
                Some(0) => {
                    modes.fail_save_utxo_after = None;
                    Err(WalletError::StorageError(
                        "injected failure: save_utxo".to_string(),
                    ))
                }
                Some(n) => {
                    modes.fail_save_utxo_after = Some(n - 1);
                    Ok(())
                }
                None => Ok(()),
            },
            "get" if modes.fail_get_operations => {
                modes.fail_get_operations = false;
                Err(WalletError::StorageError(
                    "injected failure: get operation".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl WalletStorage for MemoryWalletStorage {
    async fn get_utxos(&self, query: &UtxoQuery) -> WalletResult<Vec<Utxo>> {
        self.check_failure("get")?;
        let mut utxos: Vec<Utxo> = lock(&self.utxos)
            .values()
            .filter(|u| query.matches(u))
            .cloned()
            .collect();
        utxos.sort_by(|a, b| {
            a.satoshis
                .cmp(&b.satoshis)
                .then_with(|| a.transaction_id.cmp(&b.transaction_id))
                .then_with(|| a.output_index.cmp(&b.output_index))
        });
        if let Some(limit) = query.limit {
            utxos.truncate(limit);
        }
        Ok(utxos)
    }

    async fn get_utxo(&self, id: &str) -> WalletResult<Option<Utxo>> {
        self.check_failure("get")?;
        Ok(lock(&self.utxos).get(id).cloned())
    }

    async fn save_utxo(&self, utxo: &Utxo) -> WalletResult<()> {
        self.check_failure("save_utxo")?;
        lock(&self.utxos).insert(utxo.id.clone(), utxo.clone());
        Ok(())
    }

    async fn get_transaction_by_id(&self, txid: &str) -> WalletResult<Option<RecordedTransaction>> {
        self.check_failure("get")?;
        Ok(lock(&self.transactions).get(txid).cloned())
    }

    async fn save_transaction(&self, tx: &RecordedTransaction) -> WalletResult<()> {
        self.check_failure("save_transaction")?;
        lock(&self.transactions).insert(tx.id.clone(), tx.clone());
        Ok(())
    }

    async fn get_draft(&self, id: &str) -> WalletResult<Option<DraftTransaction>> {
        self.check_failure("get")?;
        Ok(lock(&self.drafts).get(id).cloned())
    }

    async fn save_draft(&self, draft: &DraftTransaction) -> WalletResult<()> {
        self.check_failure("save_draft")?;
        lock(&self.drafts).insert(draft.id.clone(), draft.clone());
        Ok(())
    }

    async fn get_drafts(&self, query: &DraftQuery) -> WalletResult<Vec<DraftTransaction>> {
        self.check_failure("get")?;
        let mut drafts: Vec<DraftTransaction> = lock(&self.drafts)
            .values()
            .filter(|d| query.matches(d))
            .cloned()
            .collect();
        drafts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = query.limit {
            drafts.truncate(limit);
        }
        Ok(drafts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::types::UtxoPointer;
    use crate::storage::TransactionLookup;

    fn utxo(index: u32, sats: u64) -> Utxo {
        Utxo::new(
            "owner",
            UtxoPointer::new("cd".repeat(32), index),
            "76a914000000000000000000000000000000000000000088ac",
            sats,
        )
    }

    #[tokio::test]
    async fn test_utxos_sorted_by_value() {
        let storage = MemoryWalletStorage::new();
        storage.save_utxo(&utxo(0, 300)).await.unwrap();
        storage.save_utxo(&utxo(1, 100)).await.unwrap();
        storage.save_utxo(&utxo(2, 200)).await.unwrap();

        let all = storage
            .get_utxos(&UtxoQuery::for_owner("owner").unwrap())
            .await
            .unwrap();
        let values: Vec<u64> = all.iter().map(|u| u.satoshis).collect();
        assert_eq!(values, vec![100, 200, 300]);

        let limited = storage
            .get_utxos(&UtxoQuery::for_owner("owner").unwrap().with_limit(1))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_save_utxo_failure_after_n() {
        let storage = MemoryWalletStorage::new();
        storage.set_failure_mode(MemoryFailureModes {
            fail_save_utxo_after: Some(1),
            ..Default::default()
        });
        assert!(storage.save_utxo(&utxo(0, 1)).await.is_ok());
        assert!(storage.save_utxo(&utxo(1, 1)).await.is_err());
        assert!(storage.save_utxo(&utxo(2, 1)).await.is_ok());
        assert_eq!(storage.utxo_count(), 2);
    }

    #[tokio::test]
    async fn test_one_shot_get_failure() {
        let storage = MemoryWalletStorage::new();
        storage.set_failure_mode(MemoryFailureModes {
            fail_get_operations: true,
            ..Default::default()
        });
        assert!(storage.get_utxo("x").await.is_err());
        assert!(storage.get_utxo("x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_storage_is_a_transaction_lookup() {
        let storage = MemoryWalletStorage::new();
        let tx = RecordedTransaction::from_transaction(
            &crate::data_structures::transaction::Transaction::new(),
        )
        .unwrap();
        storage.save_transaction(&tx).await.unwrap();
        let found = storage.get_transaction(&tx.id).await.unwrap();
        assert_eq!(found, Some(tx));
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let storage = MemoryWalletStorage::new();
        storage.save_utxo(&utxo(0, 1)).await.unwrap();
        storage.reset();
        assert_eq!(storage.utxo_count(), 0);
    }
}
