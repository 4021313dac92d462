//! Storage trait definition for UTXOs, transactions and drafts
//!
//! This module defines the `WalletStorage` trait that the funding engine uses
//! for persistence, together with typed query specifications. Stores only need
//! single-row atomicity; multi-row consistency comes from the per-owner
//! reservation lock.

use async_trait::async_trait;

use crate::data_structures::{
    draft_transaction::{DraftStatus, DraftTransaction},
    recorded_transaction::RecordedTransaction,
    script::ScriptType,
    types::UtxoPointer,
    utxo::Utxo,
};
use crate::errors::{WalletError, WalletResult};

use super::utxo_status::UtxoStatus;

/// Query specification for UTXOs of one owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoQuery {
    /// Owning account (required)
    pub owner_id: String,
    /// Filter by derived status
    pub status: Option<UtxoStatus>,
    /// Filter by script type
    pub script_type: Option<ScriptType>,
    /// Only UTXOs reserved by this draft
    pub draft_id: Option<String>,
    /// Only these outpoints
    pub pointers: Option<Vec<UtxoPointer>>,
    /// Limit number of results
    pub limit: Option<usize>,
}

impl UtxoQuery {
    /// Query all UTXOs of `owner_id`
    pub fn for_owner(owner_id: impl Into<String>) -> WalletResult<Self> {
        let owner_id = owner_id.into();
        if owner_id.trim().is_empty() {
            return Err(WalletError::InvalidQuery("owner id is required".to_string()));
        }
        Ok(Self {
            owner_id,
            status: None,
            script_type: None,
            draft_id: None,
            pointers: None,
            limit: None,
        })
    }

    /// Filter by status
    pub fn with_status(mut self, status: UtxoStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Unreserved and unspent only
    pub fn spendable(self) -> Self {
        self.with_status(UtxoStatus::Unspent)
    }

    /// Filter by script type
    pub fn with_script_type(mut self, script_type: ScriptType) -> Self {
        self.script_type = Some(script_type);
        self
    }

    /// Only UTXOs held by `draft_id`
    pub fn reserved_by(mut self, draft_id: impl Into<String>) -> Self {
        self.draft_id = Some(draft_id.into());
        self.status = Some(UtxoStatus::Reserved);
        self
    }

    /// Restrict to outpoints; an empty list leaves the query unrestricted
    pub fn with_pointers(mut self, pointers: &[UtxoPointer]) -> Self {
        if !pointers.is_empty() {
            self.pointers = Some(pointers.to_vec());
        }
        self
    }

    /// Set result limit
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `utxo` satisfies every filter
    pub fn matches(&self, utxo: &Utxo) -> bool {
        utxo.owner_id == self.owner_id
            && self.status.map(|s| utxo.status() == s).unwrap_or(true)
            && self
                .script_type
                .map(|t| utxo.script_type == t)
                .unwrap_or(true)
            && self
                .draft_id
                .as_ref()
                .map(|d| utxo.draft_id.as_ref() == Some(d))
                .unwrap_or(true)
            && self
                .pointers
                .as_ref()
                .map(|ps| ps.contains(&utxo.pointer()))
                .unwrap_or(true)
    }
}

/// Query specification for drafts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftQuery {
    pub owner_id: Option<String>,
    pub status: Option<DraftStatus>,
    /// Only drafts with `expires_at` at or before this time (ms)
    pub expires_before: Option<u64>,
    pub limit: Option<usize>,
}

impl DraftQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn with_status(mut self, status: DraftStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn expiring_before(mut self, at_ms: u64) -> Self {
        self.expires_before = Some(at_ms);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, draft: &DraftTransaction) -> bool {
        self.owner_id
            .as_ref()
            .map(|o| &draft.owner_id == o)
            .unwrap_or(true)
            && self.status.map(|s| draft.status == s).unwrap_or(true)
            && self
                .expires_before
                .map(|t| draft.expires_at <= t)
                .unwrap_or(true)
    }
}

/// Persistence used by the funding engine
#[async_trait]
pub trait WalletStorage: Send + Sync {
    /// Create tables or other backing structures
    async fn initialize(&self) -> WalletResult<()> {
        Ok(())
    }

    // === UTXO operations ===

    /// UTXOs matching `query`
    async fn get_utxos(&self, query: &UtxoQuery) -> WalletResult<Vec<Utxo>>;

    /// UTXO by id
    async fn get_utxo(&self, id: &str) -> WalletResult<Option<Utxo>>;

    /// Insert or replace a UTXO
    async fn save_utxo(&self, utxo: &Utxo) -> WalletResult<()>;

    // === Transaction operations ===

    /// Recorded transaction by txid (display hex)
    async fn get_transaction_by_id(&self, txid: &str) -> WalletResult<Option<RecordedTransaction>>;

    /// Insert or replace a recorded transaction
    async fn save_transaction(&self, tx: &RecordedTransaction) -> WalletResult<()>;

    // === Draft operations ===

    async fn get_draft(&self, id: &str) -> WalletResult<Option<DraftTransaction>>;

    async fn save_draft(&self, draft: &DraftTransaction) -> WalletResult<()>;

    async fn get_drafts(&self, query: &DraftQuery) -> WalletResult<Vec<DraftTransaction>>;
}

/// Resolves txids to recorded transactions when walking ancestry
#[async_trait]
pub trait TransactionLookup: Send + Sync {
    async fn get_transaction(&self, txid: &str) -> WalletResult<Option<RecordedTransaction>>;
}

#[async_trait]
impl<S: WalletStorage + ?Sized> TransactionLookup for S {
    async fn get_transaction(&self, txid: &str) -> WalletResult<Option<RecordedTransaction>> {
        self.get_transaction_by_id(txid).await
    }
}
