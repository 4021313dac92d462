//! Draft state transitions after creation
//!
//! A draft leaves [`DraftStatus::Draft`] exactly once: canceled by its owner,
//! expired by the cleanup task, or completed with a signed transaction. Every
//! transition runs under the owner's reservation lock so it cannot interleave
//! with a concurrent reservation.

use crate::data_structures::{
    draft_transaction::{DraftStatus, DraftTransaction},
    recorded_transaction::RecordedTransaction,
    transaction::Transaction,
    utxo::Utxo,
    UtxoPointer,
};
use crate::engine::EngineContext;
use crate::errors::{WalletError, WalletResult};
use crate::events::DraftEvent;
use crate::storage::DraftQuery;

async fn load_open_draft(
    ctx: &EngineContext,
    owner_id: &str,
    draft_id: &str,
) -> WalletResult<DraftTransaction> {
    let draft = ctx
        .storage
        .get_draft(draft_id)
        .await?
        .filter(|d| d.owner_id == owner_id)
        .ok_or_else(|| WalletError::ResourceNotFound(format!("draft {draft_id}")))?;
    if draft.status != DraftStatus::Draft {
        return Err(WalletError::InvalidDraftState(format!(
            "draft {draft_id} is {}",
            draft.status.as_str()
        )));
    }
    Ok(draft)
}

/// Move an open draft to `status` and release its reservations
async fn close_draft(
    ctx: &EngineContext,
    owner_id: &str,
    draft_id: &str,
    status: DraftStatus,
) -> WalletResult<usize> {
    let reservations = ctx.reservations();
    let guard = reservations.lock_owner(owner_id).await?;
    let result = async {
        let mut draft = load_open_draft(ctx, owner_id, draft_id).await?;
        let released = reservations.release_draft_utxos(owner_id, draft_id).await?;
        draft.status = status;
        ctx.storage.save_draft(&draft).await?;
        Ok::<_, WalletError>(released)
    }
    .await;
    guard.release().await?;
    result
}

/// Cancel an open draft. Its UTXOs become spendable again.
pub async fn cancel_draft(ctx: &EngineContext, owner_id: &str, draft_id: &str) -> WalletResult<()> {
    let released = close_draft(ctx, owner_id, draft_id, DraftStatus::Canceled).await?;
    tracing::info!(owner = owner_id, draft_id, released, "draft canceled");
    ctx.publish(DraftEvent::draft_canceled(owner_id, draft_id)).await;
    Ok(())
}

/// Expire an open draft
pub async fn expire_draft(ctx: &EngineContext, owner_id: &str, draft_id: &str) -> WalletResult<()> {
    let released = close_draft(ctx, owner_id, draft_id, DraftStatus::Expired).await?;
    tracing::info!(owner = owner_id, draft_id, released, "draft expired");
    ctx.publish(DraftEvent::draft_expired(owner_id, draft_id)).await;
    Ok(())
}

/// Expire every open draft whose deadline is at or before `now_ms`.
///
/// Drafts that fail to expire are logged and left for the next sweep.
pub async fn expire_stale_drafts(ctx: &EngineContext, now_ms: u64) -> WalletResult<usize> {
    let stale = ctx
        .storage
        .get_drafts(
            &DraftQuery::new()
                .with_status(DraftStatus::Draft)
                .expiring_before(now_ms),
        )
        .await?;

    let mut expired = 0;
    for draft in stale {
        match expire_draft(ctx, &draft.owner_id, &draft.id).await {
            Ok(()) => expired += 1,
            // Completed or canceled since the query ran
            Err(WalletError::InvalidDraftState(_)) => {}
            Err(e) => {
                tracing::warn!(draft_id = %draft.id, error = %e, "failed to expire draft");
            }
        }
    }
    Ok(expired)
}

/// Release the reservations of `draft_id` unless it names an open draft.
///
/// An open draft keeps its inputs until it is canceled, expired or completed.
pub async fn unreserve(ctx: &EngineContext, owner_id: &str, draft_id: &str) -> WalletResult<usize> {
    let reservations = ctx.reservations();
    let guard = reservations.lock_owner(owner_id).await?;
    let result = async {
        let open = ctx
            .storage
            .get_draft(draft_id)
            .await?
            .map(|d| d.owner_id == owner_id && d.status == DraftStatus::Draft)
            .unwrap_or(false);
        if open {
            return Err(WalletError::InvalidDraftState(format!(
                "draft {draft_id} is open; cancel it to release its utxos"
            )));
        }
        reservations.release_draft_utxos(owner_id, draft_id).await
    }
    .await;
    guard.release().await?;
    result
}

/// The signed transaction must spend the draft's inputs and pay its outputs
fn check_matches_draft(signed: &Transaction, draft: &DraftTransaction) -> WalletResult<()> {
    let unsigned = Transaction::from_hex(&draft.hex)?;

    let mut expected: Vec<UtxoPointer> = unsigned.inputs.iter().map(|i| i.outpoint()).collect();
    let mut actual: Vec<UtxoPointer> = signed.inputs.iter().map(|i| i.outpoint()).collect();
    expected.sort();
    actual.sort();
    if expected != actual {
        return Err(WalletError::TransactionMismatch(
            "inputs differ from the draft".to_string(),
        ));
    }
    if unsigned.outputs != signed.outputs {
        return Err(WalletError::TransactionMismatch(
            "outputs differ from the draft".to_string(),
        ));
    }
    Ok(())
}

/// Record the signed transaction of an open draft.
///
/// The inputs the signed transaction spends are marked spent, outputs that pay the owner become new
/// UTXOs and the draft moves to [`DraftStatus::Complete`].
pub async fn complete_draft(
    ctx: &EngineContext,
    owner_id: &str,
    draft_id: &str,
    signed_hex: &str,
) -> WalletResult<RecordedTransaction> {
    let signed = Transaction::from_hex(signed_hex)?;
    let mut record = RecordedTransaction::from_transaction(&signed)?;
    record.draft_id = Some(draft_id.to_string());

    let reservations = ctx.reservations();
    let guard = reservations.lock_owner(owner_id).await?;
    let result = async {
        let mut draft = load_open_draft(ctx, owner_id, draft_id).await?;
        check_matches_draft(&signed, &draft)?;

        let outpoints: Vec<UtxoPointer> = signed.inputs.iter().map(|i| i.outpoint()).collect();
        let spent = reservations
            .mark_spent(owner_id, draft_id, &outpoints, &record.id)
            .await?;
        ctx.storage.save_transaction(&record).await?;

        let mut received = 0;
        for (vout, output) in signed.outputs.iter().enumerate() {
            let script = hex::encode(&output.locking_script);
            if ctx
                .destinations
                .destination_for_script(owner_id, &script)
                .await?
                .is_none()
            {
                continue;
            }
            let utxo = Utxo::new(
                owner_id,
                UtxoPointer::new(record.id.clone(), vout as u32),
                script,
                output.satoshis,
            );
            ctx.storage.save_utxo(&utxo).await?;
            received += 1;
        }

        draft.status = DraftStatus::Complete;
        draft.final_tx_id = Some(record.id.clone());
        ctx.storage.save_draft(&draft).await?;
        Ok::<_, WalletError>((spent, received))
    }
    .await;
    guard.release().await?;
    let (spent, received) = result?;

    tracing::info!(
        owner = owner_id,
        draft_id,
        tx_id = %record.id,
        spent,
        received,
        "draft completed"
    );
    ctx.publish(DraftEvent::draft_completed(owner_id, draft_id, &record.id))
        .await;
    Ok(record)
}
