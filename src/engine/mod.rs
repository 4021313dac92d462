//! Funding engine facade
//!
//! [`FundingEngine`] owns an [`EngineContext`] and exposes the operations a
//! wallet service calls: create a funded draft, cancel or complete it,
//! release its reservations, and export a BEEF bundle for it.

pub mod context;

pub use context::{EngineContext, EngineContextBuilder};

use tokio::task::JoinHandle;

use crate::beef::{self, Beef};
use crate::data_structures::{
    draft_transaction::{DraftTransaction, TransactionConfig},
    recorded_transaction::RecordedTransaction,
};
use crate::drafts::{self, DraftBuilder};
use crate::errors::{WalletError, WalletResult};
use crate::tasks::{AtomicCancellationToken, CancellationHandle, DraftCleanupTask};
use crate::utils::current_timestamp_ms;

/// Entry point for draft funding and proof export
#[derive(Clone)]
pub struct FundingEngine {
    ctx: EngineContext,
}

impl FundingEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Build, fund and persist a draft for `owner_id`
    pub async fn create_draft(
        &self,
        owner_id: &str,
        configuration: TransactionConfig,
    ) -> WalletResult<DraftTransaction> {
        DraftBuilder::new(&self.ctx).build(owner_id, configuration).await
    }

    pub async fn get_draft(&self, owner_id: &str, draft_id: &str) -> WalletResult<DraftTransaction> {
        self.ctx
            .storage
            .get_draft(draft_id)
            .await?
            .filter(|d| d.owner_id == owner_id)
            .ok_or_else(|| WalletError::ResourceNotFound(format!("draft {draft_id}")))
    }

    pub async fn cancel_draft(&self, owner_id: &str, draft_id: &str) -> WalletResult<()> {
        drafts::cancel_draft(&self.ctx, owner_id, draft_id).await
    }

    /// Record the signed transaction of a draft
    pub async fn complete_draft(
        &self,
        owner_id: &str,
        draft_id: &str,
        signed_hex: &str,
    ) -> WalletResult<RecordedTransaction> {
        drafts::complete_draft(&self.ctx, owner_id, draft_id, signed_hex).await
    }

    /// Release every UTXO reserved by `draft_id`. Open drafts are refused;
    /// use [`FundingEngine::cancel_draft`] for those.
    pub async fn unreserve(&self, owner_id: &str, draft_id: &str) -> WalletResult<usize> {
        drafts::unreserve(&self.ctx, owner_id, draft_id).await
    }

    /// Expire open drafts whose deadline has passed
    pub async fn expire_stale_drafts(&self) -> WalletResult<usize> {
        drafts::expire_stale_drafts(&self.ctx, current_timestamp_ms()).await
    }

    /// BEEF bundle of a draft: the final transaction once completed, the
    /// unsigned one before that
    pub async fn to_beef(&self, owner_id: &str, draft_id: &str) -> WalletResult<Beef> {
        let draft = self.get_draft(owner_id, draft_id).await?;
        let root = match &draft.final_tx_id {
            Some(tx_id) => self
                .ctx
                .storage
                .get_transaction_by_id(tx_id)
                .await?
                .ok_or_else(|| WalletError::ResourceNotFound(format!("transaction {tx_id}")))?,
            None => RecordedTransaction::from_hex(&draft.hex)?,
        };
        beef::encode(&root, &*self.ctx.storage).await
    }

    pub async fn to_beef_hex(&self, owner_id: &str, draft_id: &str) -> WalletResult<String> {
        self.to_beef(owner_id, draft_id).await?.to_hex()
    }

    /// Start the periodic draft cleanup; cancel it through the returned handle
    pub fn spawn_cleanup(&self) -> (CancellationHandle, JoinHandle<()>) {
        let (token, handle) = AtomicCancellationToken::create_pair();
        let task = DraftCleanupTask::new(self.ctx.clone(), token).spawn();
        (handle, task)
    }
}
