//! Block Unified Merkle Paths (BRC-74)
//!
//! A BUMP proves inclusion of one or more transactions in a block. Levels run
//! bottom-up: level 0 holds the transaction leaves and their siblings, each
//! higher level holds the sibling hashes needed to climb to the root.
//!
//! ## Binary format
//!
//! - block height: varint
//! - tree height: u8 (number of levels)
//! - per level: varint leaf count, then per leaf
//!   - offset: varint
//!   - flags: u8 (`0` hash, `1` duplicate, `2` client txid)
//!   - hash: 32 bytes unless the duplicate flag is set

use byteorder::{ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read};

use crate::data_structures::types::Hash256;
use crate::errors::{ProofError, SerializationError, WalletResult};
use crate::utils::{merkle_parent, read_varint, write_varint};

/// Leaf carries a sibling or branch hash
pub const FLAG_HASH: u8 = 0;
/// Leaf duplicates its pair (odd leaf count)
pub const FLAG_DUPLICATE: u8 = 1;
/// Leaf is a transaction the client asked to prove
pub const FLAG_TXID: u8 = 2;

const MAX_TREE_HEIGHT: usize = 64;

/// One leaf of a path level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BumpLeaf {
    pub offset: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<Hash256>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub txid: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
}

impl BumpLeaf {
    pub fn hash(offset: u64, hash: Hash256) -> Self {
        Self {
            offset,
            hash: Some(hash),
            txid: false,
            duplicate: false,
        }
    }

    pub fn target(offset: u64, txid: Hash256) -> Self {
        Self {
            offset,
            hash: Some(txid),
            txid: true,
            duplicate: false,
        }
    }

    pub fn duplicate(offset: u64) -> Self {
        Self {
            offset,
            hash: None,
            txid: false,
            duplicate: true,
        }
    }

    pub fn flags(&self) -> u8 {
        if self.duplicate {
            FLAG_DUPLICATE
        } else if self.txid {
            FLAG_TXID
        } else {
            FLAG_HASH
        }
    }
}

/// Compacted merkle path for one block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Bump {
    #[serde(rename = "blockHeight")]
    pub block_height: u64,
    pub path: Vec<Vec<BumpLeaf>>,
}

enum Node {
    Hash([u8; 32]),
    Duplicate,
}

impl Bump {
    pub fn new(block_height: u64) -> Self {
        Self {
            block_height,
            path: Vec::new(),
        }
    }

    /// A path with no levels carries no proof
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    pub fn tree_height(&self) -> usize {
        self.path.len()
    }

    /// Whether `txid` is one of the level 0 leaves
    pub fn contains_txid(&self, txid: &Hash256) -> bool {
        self.path
            .first()
            .map(|level| level.iter().any(|leaf| leaf.hash.as_ref() == Some(txid)))
            .unwrap_or(false)
    }

    /// Txids flagged as proven by this path
    pub fn txids(&self) -> Vec<Hash256> {
        self.path
            .first()
            .map(|level| {
                level
                    .iter()
                    .filter(|leaf| leaf.txid)
                    .filter_map(|leaf| leaf.hash)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Recompute the merkle root for `txid`, resolving duplicate flags
    pub fn compute_root(&self, txid: &Hash256) -> WalletResult<Hash256> {
        let leaf = self
            .path
            .first()
            .and_then(|level| level.iter().find(|leaf| leaf.hash.as_ref() == Some(txid)))
            .ok_or_else(|| ProofError::LeafNotFound(txid.to_hex()))?;

        let mut working = txid.0;
        let mut offset = leaf.offset;
        for level in 0..self.path.len() {
            let sibling = match self.node_at(level, offset ^ 1)? {
                Node::Hash(h) => h,
                Node::Duplicate => working,
            };
            working = if offset % 2 == 0 {
                merkle_parent(&working, &sibling)
            } else {
                merkle_parent(&sibling, &working)
            };
            offset >>= 1;
        }
        Ok(Hash256::new(working))
    }

    /// Node at a position, computed from the level below when not stored
    fn node_at(&self, level: usize, offset: u64) -> WalletResult<Node> {
        if let Some(leaf) = self.path[level].iter().find(|l| l.offset == offset) {
            if leaf.duplicate {
                return Ok(Node::Duplicate);
            }
            return leaf
                .hash
                .map(|h| Node::Hash(h.0))
                .ok_or_else(|| ProofError::MissingSibling { level, offset }.into());
        }
        if level == 0 {
            return Err(ProofError::MissingSibling { level, offset }.into());
        }
        let left = match self.node_at(level - 1, offset * 2)? {
            Node::Hash(h) => h,
            Node::Duplicate => return Err(ProofError::MissingSibling { level, offset }.into()),
        };
        let right = match self.node_at(level - 1, offset * 2 + 1)? {
            Node::Hash(h) => h,
            Node::Duplicate => left,
        };
        Ok(Node::Hash(merkle_parent(&left, &right)))
    }

    pub fn write_to(&self, buf: &mut Vec<u8>) -> WalletResult<()> {
        if self.path.len() > MAX_TREE_HEIGHT {
            return Err(SerializationError::InvalidData(format!(
                "tree height {} exceeds {MAX_TREE_HEIGHT}",
                self.path.len()
            ))
            .into());
        }
        write_varint(buf, self.block_height)?;
        buf.write_u8(self.path.len() as u8)?;
        for level in &self.path {
            write_varint(buf, level.len() as u64)?;
            for leaf in level {
                write_varint(buf, leaf.offset)?;
                let flags = leaf.flags();
                buf.write_u8(flags)?;
                if flags != FLAG_DUPLICATE {
                    let hash = leaf.hash.ok_or_else(|| {
                        ProofError::InvalidNode(format!("leaf at offset {} has no hash", leaf.offset))
                    })?;
                    buf.extend_from_slice(hash.as_bytes());
                }
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> WalletResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    pub fn to_hex(&self) -> WalletResult<String> {
        Ok(hex::encode(self.to_bytes()?))
    }

    pub fn read_from<R: Read>(reader: &mut R) -> WalletResult<Self> {
        let block_height = read_varint(reader)?;
        let tree_height = reader.read_u8()? as usize;
        if tree_height > MAX_TREE_HEIGHT {
            return Err(SerializationError::InvalidData(format!(
                "tree height {tree_height} exceeds {MAX_TREE_HEIGHT}"
            ))
            .into());
        }
        let mut path = Vec::with_capacity(tree_height);
        for _ in 0..tree_height {
            let n_leaves = read_varint(reader)?;
            let mut level = Vec::with_capacity(n_leaves.min(1024) as usize);
            for _ in 0..n_leaves {
                let offset = read_varint(reader)?;
                let flags = reader.read_u8()?;
                let leaf = match flags {
                    FLAG_DUPLICATE => BumpLeaf::duplicate(offset),
                    FLAG_HASH | FLAG_TXID => {
                        let mut hash = [0u8; 32];
                        reader.read_exact(&mut hash)?;
                        BumpLeaf {
                            offset,
                            hash: Some(Hash256::new(hash)),
                            txid: flags == FLAG_TXID,
                            duplicate: false,
                        }
                    }
                    other => return Err(ProofError::InvalidFlags(other).into()),
                };
                level.push(leaf);
            }
            path.push(level);
        }
        Ok(Self { block_height, path })
    }

    pub fn from_bytes(bytes: &[u8]) -> WalletResult<Self> {
        Self::read_from(&mut Cursor::new(bytes))
    }

    pub fn from_hex(bump_hex: &str) -> WalletResult<Self> {
        Self::from_bytes(&hex::decode(bump_hex)?)
    }
}
