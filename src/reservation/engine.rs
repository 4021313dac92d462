//! Greedy UTXO selection and reservation under the per-owner lock

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::data_structures::{script::ScriptType, types::UtxoPointer, utxo::Utxo};
use crate::errors::{WalletError, WalletResult};
use crate::events::{DraftEvent, EventDispatcher};
use crate::fees::{FeeUnit, TX_OVERHEAD_SIZE};
use crate::locks::{reservation_lock_key, wait_acquire, LockGuard, LockService};
use crate::storage::{UtxoQuery, WalletStorage};
use crate::utils::current_timestamp_ms;

/// What to reserve for one draft
#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub owner_id: String,
    pub draft_id: String,
    /// Satoshis the selected inputs must cover on top of their own fee
    pub target: u64,
    pub fee_unit: FeeUnit,
    /// Restrict candidates to these outpoints; empty means all
    pub from_utxos: Vec<UtxoPointer>,
    /// Reserved regardless of selection; their value is not counted toward `target`
    pub include_utxos: Vec<UtxoPointer>,
    pub script_type: Option<ScriptType>,
}

impl ReservationRequest {
    pub fn new(owner_id: impl Into<String>, draft_id: impl Into<String>, target: u64) -> Self {
        Self {
            owner_id: owner_id.into(),
            draft_id: draft_id.into(),
            target,
            fee_unit: FeeUnit::default(),
            from_utxos: Vec::new(),
            include_utxos: Vec::new(),
            script_type: Some(ScriptType::PubKeyHash),
        }
    }

    pub fn with_fee_unit(mut self, fee_unit: FeeUnit) -> Self {
        self.fee_unit = fee_unit;
        self
    }

    pub fn with_from_utxos(mut self, pointers: Vec<UtxoPointer>) -> Self {
        self.from_utxos = pointers;
        self
    }

    pub fn with_include_utxos(mut self, pointers: Vec<UtxoPointer>) -> Self {
        self.include_utxos = pointers;
        self
    }

    pub fn with_script_type(mut self, script_type: Option<ScriptType>) -> Self {
        self.script_type = script_type;
        self
    }
}

/// UTXOs written as reserved for a draft
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reservation {
    /// Selected UTXOs in selection order
    pub selected: Vec<Utxo>,
    /// Force-included UTXOs
    pub included: Vec<Utxo>,
    /// Fee estimate over overhead and inputs at the point selection stopped
    pub fee: u64,
}

impl Reservation {
    pub fn selected_satoshis(&self) -> u64 {
        self.selected.iter().map(|u| u.satoshis).sum()
    }

    pub fn total_satoshis(&self) -> u64 {
        self.selected_satoshis() + self.included.iter().map(|u| u.satoshis).sum::<u64>()
    }

    /// Included first, then selected
    pub fn utxos(&self) -> impl Iterator<Item = &Utxo> {
        self.included.iter().chain(self.selected.iter())
    }
}

/// Reserves and releases UTXOs on behalf of drafts
#[derive(Clone)]
pub struct ReservationEngine {
    storage: Arc<dyn WalletStorage>,
    locks: Arc<dyn LockService>,
    events: Arc<Mutex<EventDispatcher>>,
    lock_ttl: Duration,
    lock_wait: Duration,
}

impl ReservationEngine {
    pub fn new(
        storage: Arc<dyn WalletStorage>,
        locks: Arc<dyn LockService>,
        events: Arc<Mutex<EventDispatcher>>,
        lock_ttl: Duration,
        lock_wait: Duration,
    ) -> Self {
        Self {
            storage,
            locks,
            events,
            lock_ttl,
            lock_wait,
        }
    }

    /// Take the reservation lock of `owner_id`
    pub async fn lock_owner(&self, owner_id: &str) -> WalletResult<LockGuard> {
        wait_acquire(
            &self.locks,
            &reservation_lock_key(owner_id),
            self.lock_ttl,
            self.lock_wait,
        )
        .await
    }

    /// Force-include `request.include_utxos`, then select greedily until the
    /// selection covers `target` plus the fee of every input so far.
    pub async fn reserve(&self, request: &ReservationRequest) -> WalletResult<Reservation> {
        let guard = self.lock_owner(&request.owner_id).await?;
        let result = self.reserve_locked(request).await;
        guard.release().await?;

        let reservation = result?;
        self.publish_reserved(&request.owner_id, &request.draft_id, &reservation)
            .await;
        Ok(reservation)
    }

    async fn reserve_locked(&self, request: &ReservationRequest) -> WalletResult<Reservation> {
        let included = self
            .load_included(&request.owner_id, &request.draft_id, &request.include_utxos)
            .await?;

        let mut query = UtxoQuery::for_owner(&request.owner_id)?
            .spendable()
            .with_pointers(&request.from_utxos);
        if let Some(script_type) = request.script_type {
            query = query.with_script_type(script_type);
        }
        let candidates = self.storage.get_utxos(&query).await?;

        let mut input_size: u64 = included.iter().map(|u| u.script_type.input_size()).sum();
        let mut selected = Vec::new();
        let mut reserved = 0u64;
        let mut fee = request.fee_unit.fee_for_size(TX_OVERHEAD_SIZE + input_size);

        for utxo in candidates {
            if reserved >= request.target + fee {
                break;
            }
            if included.iter().any(|u| u.id == utxo.id) {
                continue;
            }
            input_size += utxo.script_type.input_size();
            reserved += utxo.satoshis;
            fee = request.fee_unit.fee_for_size(TX_OVERHEAD_SIZE + input_size);
            selected.push(utxo);
        }

        if reserved < request.target + fee {
            tracing::debug!(
                owner = %request.owner_id,
                draft_id = %request.draft_id,
                reserved,
                required = request.target + fee,
                "not enough spendable utxos"
            );
            return Err(WalletError::InsufficientFunds(format!(
                "reserved {reserved} of {} required",
                request.target + fee
            )));
        }

        let mut to_write = included;
        let included_count = to_write.len();
        to_write.extend(selected);
        let written = self
            .write_reservations(&request.owner_id, &request.draft_id, to_write)
            .await?;
        let (included, selected) = written.split_at(included_count);

        tracing::debug!(
            owner = %request.owner_id,
            draft_id = %request.draft_id,
            selected = selected.len(),
            included = included.len(),
            reserved,
            fee,
            "utxos reserved"
        );
        Ok(Reservation {
            selected: selected.to_vec(),
            included: included.to_vec(),
            fee,
        })
    }

    /// Reserve every spendable UTXO of `script_type`, optionally limited to `from_utxos`
    pub async fn reserve_all(
        &self,
        owner_id: &str,
        draft_id: &str,
        script_type: ScriptType,
        from_utxos: &[UtxoPointer],
    ) -> WalletResult<Reservation> {
        let guard = self.lock_owner(owner_id).await?;
        let result = async {
            let query = UtxoQuery::for_owner(owner_id)?
                .spendable()
                .with_script_type(script_type)
                .with_pointers(from_utxos);
            let candidates = self.storage.get_utxos(&query).await?;
            if candidates.is_empty() {
                return Err(WalletError::InsufficientFunds(
                    "no spendable utxos to sweep".to_string(),
                ));
            }
            self.write_reservations(owner_id, draft_id, candidates).await
        }
        .await;
        guard.release().await?;

        let reservation = Reservation {
            selected: result?,
            included: Vec::new(),
            fee: 0,
        };
        self.publish_reserved(owner_id, draft_id, &reservation).await;
        Ok(reservation)
    }

    /// Reserve exactly `pointers` for `draft_id`
    pub async fn include_utxos(
        &self,
        owner_id: &str,
        draft_id: &str,
        pointers: &[UtxoPointer],
    ) -> WalletResult<Vec<Utxo>> {
        let guard = self.lock_owner(owner_id).await?;
        let result = async {
            let utxos = self.load_included(owner_id, draft_id, pointers).await?;
            self.write_reservations(owner_id, draft_id, utxos).await
        }
        .await;
        guard.release().await?;
        result
    }

    /// Release every UTXO reserved by `draft_id`. Returns how many were released.
    pub async fn unreserve(&self, owner_id: &str, draft_id: &str) -> WalletResult<usize> {
        let guard = self.lock_owner(owner_id).await?;
        let result = self.release_draft_utxos(owner_id, draft_id).await;
        guard.release().await?;
        result
    }

    /// Release without taking the lock; the caller must hold it
    pub(crate) async fn release_draft_utxos(&self, owner_id: &str, draft_id: &str) -> WalletResult<usize> {
        let reserved = self
            .storage
            .get_utxos(&UtxoQuery::for_owner(owner_id)?.reserved_by(draft_id))
            .await?;
        let count = reserved.len();
        for mut utxo in reserved {
            utxo.release();
            self.storage.save_utxo(&utxo).await?;
        }
        if count > 0 {
            tracing::debug!(owner = owner_id, draft_id, count, "released reservations");
            self.events
                .lock()
                .await
                .dispatch(DraftEvent::utxos_released(owner_id, draft_id, count))
                .await;
        }
        Ok(count)
    }

    /// Mark the UTXOs at `outpoints` as spent by `tx_id`; the caller must hold the lock.
    ///
    /// Every outpoint is checked before anything is written: it must be an
    /// unspent UTXO of `owner_id` that is either free or reserved by `draft_id`.
    pub(crate) async fn mark_spent(
        &self,
        owner_id: &str,
        draft_id: &str,
        outpoints: &[UtxoPointer],
        tx_id: &str,
    ) -> WalletResult<usize> {
        let mut spending = Vec::with_capacity(outpoints.len());
        for pointer in outpoints {
            let utxo = self
                .storage
                .get_utxo(&pointer.utxo_id())
                .await?
                .filter(|u| u.owner_id == owner_id)
                .ok_or_else(|| {
                    WalletError::TransactionMismatch(format!("input {pointer} is not a wallet utxo"))
                })?;
            let held_elsewhere = utxo
                .draft_id
                .as_deref()
                .map(|d| d != draft_id)
                .unwrap_or(false);
            if utxo.spending_tx_id.is_some() || held_elsewhere {
                tracing::warn!(
                    owner = owner_id,
                    draft_id,
                    utxo = %utxo.id,
                    "input is spent or reserved by another draft"
                );
                return Err(WalletError::UtxoUnavailable(pointer.to_string()));
            }
            spending.push(utxo);
        }

        let count = spending.len();
        for mut utxo in spending {
            utxo.mark_spent(tx_id);
            self.storage.save_utxo(&utxo).await?;
        }
        Ok(count)
    }

    async fn load_included(
        &self,
        owner_id: &str,
        draft_id: &str,
        pointers: &[UtxoPointer],
    ) -> WalletResult<Vec<Utxo>> {
        let mut utxos = Vec::with_capacity(pointers.len());
        for pointer in pointers {
            let utxo = self
                .storage
                .get_utxo(&pointer.utxo_id())
                .await?
                .filter(|u| u.owner_id == owner_id)
                .ok_or_else(|| WalletError::MissingUtxo(pointer.to_string()))?;
            let held_elsewhere = utxo
                .draft_id
                .as_deref()
                .map(|d| d != draft_id)
                .unwrap_or(false);
            if utxo.spending_tx_id.is_some() || held_elsewhere {
                return Err(WalletError::UtxoUnavailable(pointer.to_string()));
            }
            if !utxos.iter().any(|u: &Utxo| u.id == utxo.id) {
                utxos.push(utxo);
            }
        }
        Ok(utxos)
    }

    /// Persist reservations; on a failed write, roll back what was written
    async fn write_reservations(
        &self,
        owner_id: &str,
        draft_id: &str,
        utxos: Vec<Utxo>,
    ) -> WalletResult<Vec<Utxo>> {
        let now = current_timestamp_ms();
        let mut written: Vec<Utxo> = Vec::with_capacity(utxos.len());
        for mut utxo in utxos {
            utxo.reserve(draft_id, now);
            if let Err(e) = self.storage.save_utxo(&utxo).await {
                self.rollback(owner_id, draft_id, &written).await;
                return Err(e);
            }
            written.push(utxo);
        }
        Ok(written)
    }

    async fn rollback(&self, owner_id: &str, draft_id: &str, written: &[Utxo]) {
        for utxo in written {
            let mut released = utxo.clone();
            released.release();
            if let Err(e) = self.storage.save_utxo(&released).await {
                tracing::warn!(
                    owner = owner_id,
                    draft_id,
                    utxo = %utxo.id,
                    error = %e,
                    "failed to roll back reservation"
                );
            }
        }
    }

    async fn publish_reserved(&self, owner_id: &str, draft_id: &str, reservation: &Reservation) {
        let ids = reservation.utxos().map(|u| u.id.clone()).collect();
        self.events
            .lock()
            .await
            .dispatch(DraftEvent::utxos_reserved(
                owner_id,
                draft_id,
                ids,
                reservation.total_satoshis(),
            ))
            .await;
    }
}
