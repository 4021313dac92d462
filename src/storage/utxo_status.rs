use serde::{Deserialize, Serialize};

/// UTXO status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UtxoStatus {
    Unspent = 0,
    Reserved = 1,
    Spent = 2,
}

impl From<u32> for UtxoStatus {
    fn from(value: u32) -> Self {
        match value {
            0 => UtxoStatus::Unspent,
            1 => UtxoStatus::Reserved,
            2 => UtxoStatus::Spent,
            _ => UtxoStatus::Unspent,
        }
    }
}

impl From<UtxoStatus> for u32 {
    fn from(status: UtxoStatus) -> Self {
        status as u32
    }
}
