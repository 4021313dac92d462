//! Single transaction merkle inclusion proofs (TSC format)

use serde::{Deserialize, Serialize};

use crate::data_structures::{transaction::Transaction, types::Hash256};
use crate::errors::{ProofError, WalletResult};

/// Sibling placeholder meaning "same hash as the node it pairs with"
pub const DUPLICATE_NODE: &str = "*";

/// Classic merkle proof: index in the block plus sibling nodes from leaf to root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MerkleProof {
    pub index: u64,
    /// Txid in display hex, or the full raw transaction in hex
    #[serde(rename = "txOrId")]
    pub tx_or_id: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub nodes: Vec<String>,
    #[serde(rename = "targetType", default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,
    #[serde(rename = "proofType", default, skip_serializing_if = "Option::is_none")]
    pub proof_type: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub composite: bool,
}

impl MerkleProof {
    pub fn new(index: u64, txid: impl Into<String>, nodes: Vec<String>) -> Self {
        Self {
            index,
            tx_or_id: txid.into(),
            nodes,
            ..Default::default()
        }
    }

    /// No transaction and no nodes
    pub fn is_empty(&self) -> bool {
        self.tx_or_id.is_empty() && self.nodes.is_empty()
    }

    /// Txid of the proven transaction, if any
    pub fn txid(&self) -> WalletResult<Option<Hash256>> {
        match self.tx_or_id.len() {
            0 => Ok(None),
            64 => Ok(Some(Hash256::from_hex(&self.tx_or_id)?)),
            _ => Ok(Some(Transaction::from_hex(&self.tx_or_id)?.txid()?)),
        }
    }

    /// Parse node `i`; `None` for the duplicate placeholder
    pub fn node(&self, i: usize) -> WalletResult<Option<Hash256>> {
        let node = self
            .nodes
            .get(i)
            .ok_or_else(|| ProofError::InvalidNode(format!("no node at position {i}")))?;
        if node == DUPLICATE_NODE {
            return Ok(None);
        }
        Hash256::from_hex(node)
            .map(Some)
            .map_err(|_| ProofError::InvalidNode(node.clone()).into())
    }
}
