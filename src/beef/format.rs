//! BEEF V1 (BRC-62) container
//!
//! ```text
//! 01 00 BE EF | varint nBUMPs | BUMP* | varint nTx | (rawTx, 0x01 varint idx | 0x00)*
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::{Cursor, Read};

use crate::data_structures::{bump::Bump, transaction::Transaction, types::Hash256};
use crate::errors::{ProofError, SerializationError, WalletError, WalletResult};
use crate::utils::{read_varint, write_varint};

/// `0100BEEF` read as a little-endian u32
pub const BEEF_V1: u32 = 0xEFBE_0001;

/// A transaction in the bundle and the index of its BUMP, when mined
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeefTx {
    pub tx: Transaction,
    pub bump_index: Option<u64>,
}

/// Transactions ordered parents-first, with the merkle paths of the mined ones
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beef {
    pub version: u32,
    pub bumps: Vec<Bump>,
    pub transactions: Vec<BeefTx>,
}

impl Default for Beef {
    fn default() -> Self {
        Self {
            version: BEEF_V1,
            bumps: Vec::new(),
            transactions: Vec::new(),
        }
    }
}

impl Beef {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last transaction, which the rest of the bundle proves
    pub fn subject(&self) -> Option<&Transaction> {
        self.transactions.last().map(|t| &t.tx)
    }

    pub fn to_bytes(&self) -> WalletResult<Vec<u8>> {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(self.version)?;
        write_varint(&mut buf, self.bumps.len() as u64)?;
        for bump in &self.bumps {
            bump.write_to(&mut buf)?;
        }
        write_varint(&mut buf, self.transactions.len() as u64)?;
        for entry in &self.transactions {
            entry.tx.write_to(&mut buf)?;
            match entry.bump_index {
                Some(index) => {
                    buf.write_u8(0x01)?;
                    write_varint(&mut buf, index)?;
                }
                None => buf.write_u8(0x00)?,
            }
        }
        Ok(buf)
    }

    pub fn to_hex(&self) -> WalletResult<String> {
        Ok(hex::encode(self.to_bytes()?))
    }

    pub fn from_bytes(bytes: &[u8]) -> WalletResult<Self> {
        let mut cursor = Cursor::new(bytes);
        let version = cursor.read_u32::<LittleEndian>()?;
        if version != BEEF_V1 {
            return Err(SerializationError::InvalidData(format!(
                "unsupported beef version {version:08x}"
            ))
            .into());
        }

        let n_bumps = read_varint(&mut cursor)?;
        let mut bumps = Vec::with_capacity(n_bumps.min(64) as usize);
        for _ in 0..n_bumps {
            bumps.push(Bump::read_from(&mut cursor)?);
        }

        let n_txs = read_varint(&mut cursor)?;
        let mut transactions = Vec::with_capacity(n_txs.min(1024) as usize);
        for _ in 0..n_txs {
            let tx = Transaction::read_from(&mut cursor)?;
            let bump_index = match cursor.read_u8()? {
                0x00 => None,
                0x01 => Some(read_varint(&mut cursor)?),
                other => {
                    return Err(SerializationError::InvalidData(format!(
                        "invalid bump marker {other:#04x}"
                    ))
                    .into())
                }
            };
            transactions.push(BeefTx { tx, bump_index });
        }

        let mut rest = Vec::new();
        cursor.read_to_end(&mut rest)?;
        if !rest.is_empty() {
            return Err(SerializationError::InvalidData(format!(
                "{} trailing bytes after beef",
                rest.len()
            ))
            .into());
        }

        Ok(Self {
            version,
            bumps,
            transactions,
        })
    }

    pub fn from_hex(beef_hex: &str) -> WalletResult<Self> {
        Self::from_bytes(&hex::decode(beef_hex)?)
    }

    /// Check that every input is satisfied by an earlier transaction of the
    /// bundle or by its own transaction's merkle path, and that every path
    /// reference points at a path containing the transaction.
    pub fn validate_ancestry(&self) -> WalletResult<()> {
        let mut seen: HashSet<Hash256> = HashSet::with_capacity(self.transactions.len());
        for entry in &self.transactions {
            let txid = entry.tx.txid()?;
            if let Some(index) = entry.bump_index {
                let bump = self.bumps.get(index as usize).ok_or_else(|| {
                    SerializationError::InvalidData(format!(
                        "bump index {index} out of range for {}",
                        txid.to_hex()
                    ))
                })?;
                if !bump.contains_txid(&txid) {
                    return Err(ProofError::LeafNotFound(txid.to_hex()).into());
                }
            } else if let Some(missing) = entry
                .tx
                .inputs
                .iter()
                .find(|input| !seen.contains(&input.prev_txid))
            {
                return Err(WalletError::UnresolvableAncestor(missing.prev_txid.to_hex()));
            }
            seen.insert(txid);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::{
        bump::BumpLeaf,
        transaction::{TxInput, TxOutput},
        types::UtxoPointer,
    };

    fn tx_spending(prev: &Hash256, vout: u32, satoshis: u64) -> Transaction {
        let mut tx = Transaction::new();
        tx.inputs
            .push(TxInput::unsigned(&UtxoPointer::new(prev.to_hex(), vout)).unwrap());
        tx.outputs.push(TxOutput {
            satoshis,
            locking_script: vec![0x51],
        });
        tx
    }

    fn mined_bump(txid: Hash256) -> Bump {
        Bump {
            block_height: 7,
            path: vec![vec![
                BumpLeaf::target(0, txid),
                BumpLeaf::hash(1, Hash256::new([9; 32])),
            ]],
        }
    }

    #[test]
    fn test_empty_beef_header() {
        let bytes = Beef::new().to_bytes().unwrap();
        assert_eq!(bytes, vec![0x01, 0x00, 0xbe, 0xef, 0x00, 0x00]);
    }

    #[test]
    fn test_parse_produced_bytes() {
        let parent = tx_spending(&Hash256::new([1; 32]), 0, 1000);
        let parent_id = parent.txid().unwrap();
        let child = tx_spending(&parent_id, 0, 900);
        let beef = Beef {
            version: BEEF_V1,
            bumps: vec![mined_bump(parent_id)],
            transactions: vec![
                BeefTx {
                    tx: parent,
                    bump_index: Some(0),
                },
                BeefTx {
                    tx: child.clone(),
                    bump_index: None,
                },
            ],
        };
        let parsed = Beef::from_hex(&beef.to_hex().unwrap()).unwrap();
        assert_eq!(parsed, beef);
        assert_eq!(parsed.subject(), Some(&child));
        parsed.validate_ancestry().unwrap();
    }

    #[test]
    fn test_rejects_wrong_version() {
        let err = Beef::from_bytes(&[0x01, 0x00, 0x00, 0x00, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err, WalletError::Serialization(_)));
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let mut bytes = Beef::new().to_bytes().unwrap();
        bytes.push(0);
        assert!(Beef::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_child_before_parent_fails_validation() {
        let parent = tx_spending(&Hash256::new([1; 32]), 0, 1000);
        let parent_id = parent.txid().unwrap();
        let child = tx_spending(&parent_id, 0, 900);
        let beef = Beef {
            version: BEEF_V1,
            bumps: vec![mined_bump(parent_id)],
            transactions: vec![
                BeefTx {
                    tx: child,
                    bump_index: None,
                },
                BeefTx {
                    tx: parent,
                    bump_index: Some(0),
                },
            ],
        };
        let err = beef.validate_ancestry().unwrap_err();
        assert!(matches!(err, WalletError::UnresolvableAncestor(id) if id == parent_id.to_hex()));
    }

    #[test]
    fn test_bump_must_contain_its_transaction() {
        let tx = tx_spending(&Hash256::new([1; 32]), 0, 1000);
        let beef = Beef {
            version: BEEF_V1,
            bumps: vec![mined_bump(Hash256::new([3; 32]))],
            transactions: vec![BeefTx {
                tx,
                bump_index: Some(0),
            }],
        };
        assert!(matches!(
            beef.validate_ancestry(),
            Err(WalletError::Proof(ProofError::LeafNotFound(_)))
        ));
    }
}
