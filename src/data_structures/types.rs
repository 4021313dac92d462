//! Core value types shared by transactions, proofs and storage

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::errors::{SerializationError, WalletResult};
use crate::utils::double_sha256;

/// A 32 byte hash kept in internal (wire) byte order.
///
/// Displayed and serialized in reversed hex, which is how txids and merkle
/// nodes are shown by explorers and carried in proof JSON.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hash of raw bytes, as used for txids
    pub fn hash(data: &[u8]) -> Self {
        Self(double_sha256(data))
    }

    /// Parse display (reversed) hex
    pub fn from_hex(hex_str: &str) -> WalletResult<Self> {
        let bytes = hex::decode(hex_str)?;
        if bytes.len() != 32 {
            return Err(SerializationError::InvalidData(format!(
                "hash must be 32 bytes, got {}",
                bytes.len()
            ))
            .into());
        }
        let mut out = [0u8; 32];
        for (i, b) in bytes.iter().rev().enumerate() {
            out[i] = *b;
        }
        Ok(Self(out))
    }

    /// Display (reversed) hex
    pub fn to_hex(&self) -> String {
        let mut reversed = self.0;
        reversed.reverse();
        hex::encode(reversed)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash256::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Reference to a transaction output
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UtxoPointer {
    pub transaction_id: String,
    pub output_index: u32,
}

impl UtxoPointer {
    pub fn new(transaction_id: impl Into<String>, output_index: u32) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            output_index,
        }
    }

    /// Stable UTXO id derived from the outpoint
    pub fn utxo_id(&self) -> String {
        let mut data = self.transaction_id.as_bytes().to_vec();
        data.extend_from_slice(&self.output_index.to_le_bytes());
        hex::encode(crate::utils::sha256(&data))
    }
}

impl fmt::Display for UtxoPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transaction_id, self.output_index)
    }
}
