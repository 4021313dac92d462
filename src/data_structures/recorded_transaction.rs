//! Transactions known to the wallet, with their proof material

use serde::{Deserialize, Serialize};

use crate::data_structures::{
    bump::Bump, merkle_proof::MerkleProof, transaction::Transaction, types::Hash256,
};
use crate::errors::WalletResult;
use crate::proofs::compact_path;

/// A recorded transaction. It counts as mined once it carries a path or a merkle proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedTransaction {
    /// Txid in display hex
    pub id: String,
    /// Raw transaction in hex
    pub hex: String,
    #[serde(default)]
    pub block_height: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_proof: Option<MerkleProof>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bump: Option<Bump>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_id: Option<String>,
}

impl RecordedTransaction {
    /// Unmined record of a raw transaction
    pub fn from_transaction(tx: &Transaction) -> WalletResult<Self> {
        Ok(Self {
            id: tx.txid()?.to_hex(),
            hex: tx.to_hex()?,
            block_height: 0,
            block_hash: None,
            merkle_proof: None,
            bump: None,
            draft_id: None,
        })
    }

    pub fn from_hex(raw_hex: &str) -> WalletResult<Self> {
        Self::from_transaction(&Transaction::from_hex(raw_hex)?)
    }

    /// Attach a merkle proof found at `block_height`
    pub fn with_merkle_proof(mut self, block_height: u64, proof: MerkleProof) -> Self {
        self.block_height = block_height;
        self.merkle_proof = Some(proof);
        self
    }

    /// Attach a compacted path
    pub fn with_bump(mut self, bump: Bump) -> Self {
        self.block_height = bump.block_height;
        self.bump = Some(bump);
        self
    }

    pub fn txid(&self) -> WalletResult<Hash256> {
        Hash256::from_hex(&self.id)
    }

    pub fn transaction(&self) -> WalletResult<Transaction> {
        Transaction::from_hex(&self.hex)
    }

    pub fn is_mined(&self) -> bool {
        self.bump.as_ref().map(|b| !b.is_empty()).unwrap_or(false)
            || self
                .merkle_proof
                .as_ref()
                .map(|p| !p.is_empty())
                .unwrap_or(false)
    }

    /// Proof path for this transaction: the stored path, else the compacted merkle proof
    pub fn proof_bump(&self) -> WalletResult<Option<Bump>> {
        if let Some(bump) = self.bump.as_ref().filter(|b| !b.is_empty()) {
            return Ok(Some(bump.clone()));
        }
        match &self.merkle_proof {
            Some(proof) if !proof.is_empty() => {
                let bump = compact_path(std::slice::from_ref(proof), self.block_height)?;
                Ok(Some(bump).filter(|b| !b.is_empty()))
            }
            _ => Ok(None),
        }
    }
}
