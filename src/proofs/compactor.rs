//! Compaction of merkle proofs into a BUMP
//!
//! Each proof is walked from leaf to root. Level 0 receives the target leaf and
//! its sibling, every higher level receives the single sibling hash at
//! `(index >> level) ^ 1`. A `"*"` node keeps the duplicate flag; resolving it
//! needs the computed hash and is left to whoever verifies the path.

use std::collections::BTreeMap;

use crate::data_structures::{
    bump::{Bump, BumpLeaf},
    merkle_proof::MerkleProof,
};
use crate::errors::WalletResult;
use crate::proofs::merger::calculate_merged_bump;

/// Compact proofs that share `block_height` into one path.
///
/// An empty slice gives a path with no levels.
pub fn compact_path(proofs: &[MerkleProof], block_height: u64) -> WalletResult<Bump> {
    let mut bumps = Vec::with_capacity(proofs.len());
    for proof in proofs {
        bumps.push(proof_to_bump(proof, block_height)?);
    }
    match bumps.len() {
        0 => Ok(Bump::new(block_height)),
        1 => Ok(bumps.remove(0)),
        _ => Ok(calculate_merged_bump(&bumps)?.unwrap_or_else(|| Bump::new(block_height))),
    }
}

/// Path for a single proof
pub fn proof_to_bump(proof: &MerkleProof, block_height: u64) -> WalletResult<Bump> {
    let mut bump = Bump::new(block_height);
    let txid = match proof.txid()? {
        Some(txid) => txid,
        None if proof.nodes.is_empty() => return Ok(bump),
        None => {
            return Err(crate::errors::ProofError::InvalidNode(
                "proof has nodes but no transaction".to_string(),
            )
            .into())
        }
    };

    let index = proof.index;
    let mut level0 = vec![BumpLeaf::target(index, txid)];
    if !proof.nodes.is_empty() {
        level0.push(sibling_leaf(proof, 0, index ^ 1)?);
    }
    level0.sort_by_key(|leaf| leaf.offset);
    bump.path.push(level0);

    for level in 1..proof.nodes.len() {
        let offset = (index >> level) ^ 1;
        bump.path.push(vec![sibling_leaf(proof, level, offset)?]);
    }
    Ok(bump)
}

fn sibling_leaf(proof: &MerkleProof, level: usize, offset: u64) -> WalletResult<BumpLeaf> {
    Ok(match proof.node(level)? {
        Some(hash) => BumpLeaf::hash(offset, hash),
        None => BumpLeaf::duplicate(offset),
    })
}

/// Group proofs by height and compact each group
pub fn compact_by_height(
    proofs: impl IntoIterator<Item = (u64, MerkleProof)>,
) -> WalletResult<Vec<Bump>> {
    let mut by_height: BTreeMap<u64, Vec<MerkleProof>> = BTreeMap::new();
    for (height, proof) in proofs {
        by_height.entry(height).or_default().push(proof);
    }
    let mut bumps = Vec::with_capacity(by_height.len());
    for (height, proofs) in by_height {
        let bump = compact_path(&proofs, height)?;
        if !bump.is_empty() {
            bumps.push(bump);
        }
    }
    Ok(bumps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::types::Hash256;

    fn node(b: u8) -> String {
        Hash256::new([b; 32]).to_hex()
    }

    fn txid() -> String {
        Hash256::new([0xee; 32]).to_hex()
    }

    #[test]
    fn test_single_proof_layout() {
        let proof = MerkleProof::new(14, txid(), vec![node(1), node(2), node(3), node(4), node(5)]);
        let bump = compact_path(&[proof], 600).unwrap();

        assert_eq!(bump.block_height, 600);
        assert_eq!(bump.path.len(), 5);
        assert_eq!(bump.path[0].len(), 2);
        assert_eq!(bump.path[0][0], BumpLeaf::target(14, Hash256::new([0xee; 32])));
        assert_eq!(bump.path[0][1], BumpLeaf::hash(15, Hash256::new([1; 32])));

        let offsets: Vec<u64> = bump.path[1..].iter().map(|l| l[0].offset).collect();
        assert_eq!(offsets, vec![6, 2, 0, 1]);
        assert!(bump.path[1..].iter().all(|l| l.len() == 1 && !l[0].txid));
    }

    #[test]
    fn test_odd_index_sorts_sibling_first() {
        let proof = MerkleProof::new(1, txid(), vec![node(1), node(2), node(3), node(4)]);
        let bump = compact_path(&[proof], 1).unwrap();
        assert_eq!(bump.path[0][0].offset, 0);
        assert!(!bump.path[0][0].txid);
        assert_eq!(bump.path[0][1].offset, 1);
        assert!(bump.path[0][1].txid);
        let offsets: Vec<u64> = bump.path[1..].iter().map(|l| l[0].offset).collect();
        assert_eq!(offsets, vec![1, 1, 1]);
    }

    #[test]
    fn test_star_node_becomes_duplicate() {
        let proof = MerkleProof::new(4, txid(), vec!["*".into(), node(2), "*".into()]);
        let bump = compact_path(&[proof], 1).unwrap();
        assert_eq!(bump.path[0][1], BumpLeaf::duplicate(5));
        assert_eq!(bump.path[1][0], BumpLeaf::hash(3, Hash256::new([2; 32])));
        assert_eq!(bump.path[2][0], BumpLeaf::duplicate(0));
    }

    #[test]
    fn test_no_nodes_gives_target_only() {
        let proof = MerkleProof::new(0, txid(), vec![]);
        let bump = compact_path(&[proof], 9).unwrap();
        assert_eq!(bump.path.len(), 1);
        assert_eq!(bump.path[0], vec![BumpLeaf::target(0, Hash256::new([0xee; 32]))]);
    }

    #[test]
    fn test_empty_inputs_give_empty_path() {
        assert!(compact_path(&[], 5).unwrap().is_empty());
        assert_eq!(compact_path(&[], 5).unwrap().block_height, 5);
        assert!(compact_path(&[MerkleProof::default()], 5).unwrap().is_empty());
    }

    #[test]
    fn test_two_proofs_are_merged() {
        let a = MerkleProof::new(0, node(0xa0), vec![node(0xa1), node(0x10)]);
        let b = MerkleProof::new(2, node(0x10), vec![node(0x11), node(0x20)]);
        let bump = compact_path(&[a, b], 3).unwrap();
        assert_eq!(bump.path[0].len(), 4);
        assert_eq!(bump.txids().len(), 2);
    }

    #[test]
    fn test_compact_by_height_sorts_heights() {
        let bumps = compact_by_height(vec![
            (20, MerkleProof::new(0, txid(), vec![node(1)])),
            (10, MerkleProof::new(1, txid(), vec![node(2)])),
        ])
        .unwrap();
        assert_eq!(bumps.iter().map(|b| b.block_height).collect::<Vec<_>>(), vec![10, 20]);
    }
}
