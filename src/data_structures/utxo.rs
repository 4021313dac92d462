//! Spendable outputs owned by an account

use serde::{Deserialize, Serialize};

use crate::data_structures::{script::ScriptType, types::UtxoPointer};
use crate::storage::UtxoStatus;

/// An output owned by `owner_id`, with its reservation state.
///
/// A UTXO is reserved by at most one draft at a time. `draft_id` and
/// `spending_tx_id` are never both set; once spent it is never reserved again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub id: String,
    pub owner_id: String,
    pub transaction_id: String,
    pub output_index: u32,
    /// Locking script in hex
    pub script_pub_key: String,
    pub satoshis: u64,
    pub script_type: ScriptType,
    pub draft_id: Option<String>,
    /// Reservation time in ms since the epoch
    pub reserved_at: Option<u64>,
    pub spending_tx_id: Option<String>,
}

impl Utxo {
    pub fn new(
        owner_id: impl Into<String>,
        pointer: UtxoPointer,
        script_pub_key: impl Into<String>,
        satoshis: u64,
    ) -> Self {
        let script_pub_key = script_pub_key.into();
        Self {
            id: pointer.utxo_id(),
            owner_id: owner_id.into(),
            script_type: ScriptType::detect_hex(&script_pub_key),
            transaction_id: pointer.transaction_id,
            output_index: pointer.output_index,
            script_pub_key,
            satoshis,
            draft_id: None,
            reserved_at: None,
            spending_tx_id: None,
        }
    }

    pub fn pointer(&self) -> UtxoPointer {
        UtxoPointer::new(self.transaction_id.clone(), self.output_index)
    }

    pub fn status(&self) -> UtxoStatus {
        if self.spending_tx_id.is_some() {
            UtxoStatus::Spent
        } else if self.draft_id.is_some() {
            UtxoStatus::Reserved
        } else {
            UtxoStatus::Unspent
        }
    }

    /// Neither reserved nor spent
    pub fn is_spendable(&self) -> bool {
        self.status() == UtxoStatus::Unspent
    }

    pub fn reserve(&mut self, draft_id: &str, at_ms: u64) {
        self.draft_id = Some(draft_id.to_string());
        self.reserved_at = Some(at_ms);
    }

    pub fn release(&mut self) {
        self.draft_id = None;
        self.reserved_at = None;
    }

    pub fn mark_spent(&mut self, tx_id: &str) {
        self.release();
        self.spending_tx_id = Some(tx_id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utxo() -> Utxo {
        Utxo::new(
            "owner",
            UtxoPointer::new("aa".repeat(32), 1),
            "76a914000000000000000000000000000000000000000088ac",
            5000,
        )
    }

    #[test]
    fn test_new_detects_script_type() {
        let u = utxo();
        assert_eq!(u.script_type, ScriptType::PubKeyHash);
        assert_eq!(u.id, u.pointer().utxo_id());
        assert!(u.is_spendable());
    }

    #[test]
    fn test_status_transitions() {
        let mut u = utxo();
        u.reserve("draft", 10);
        assert_eq!(u.status(), UtxoStatus::Reserved);
        u.release();
        assert_eq!(u.status(), UtxoStatus::Unspent);
        u.reserve("draft", 11);
        u.mark_spent("tx");
        assert_eq!(u.status(), UtxoStatus::Spent);
        assert!(u.draft_id.is_none());
        assert!(u.reserved_at.is_none());
    }
}
