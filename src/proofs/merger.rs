//! Merging of BUMPs that prove transactions in the same block

use std::collections::{btree_map::Entry, BTreeMap};

use crate::data_structures::bump::{Bump, BumpLeaf};
use crate::errors::{ProofError, WalletResult};

/// Merge the paths of one block into a single path.
///
/// Leaves at the same `(level, offset)` are kept once and must agree on their
/// hash; a txid flag on either side survives. Paths without levels are
/// ignored. Returns `None` when nothing carries a proof.
pub fn calculate_merged_bump(bumps: &[Bump]) -> WalletResult<Option<Bump>> {
    let Some(first) = bumps.first() else {
        return Ok(None);
    };
    let block_height = first.block_height;
    if let Some(other) = bumps.iter().find(|b| b.block_height != block_height) {
        return Err(ProofError::HeightMismatch {
            expected: block_height,
            found: other.block_height,
        }
        .into());
    }

    let mut non_empty = bumps.iter().filter(|b| !b.is_empty());
    let Some(base) = non_empty.next() else {
        return Ok(None);
    };
    let tree_height = base.tree_height();
    let mut levels: Vec<BTreeMap<u64, BumpLeaf>> = vec![BTreeMap::new(); tree_height];

    for bump in std::iter::once(base).chain(non_empty) {
        if bump.tree_height() != tree_height {
            return Err(ProofError::TreeHeightMismatch {
                block_height,
                expected: tree_height,
                found: bump.tree_height(),
            }
            .into());
        }
        for (level, leaves) in bump.path.iter().enumerate() {
            for leaf in leaves {
                add_leaf(&mut levels[level], leaf, block_height, level)?;
            }
        }
    }

    Ok(Some(Bump {
        block_height,
        path: levels
            .into_iter()
            .map(|level| level.into_values().collect())
            .collect(),
    }))
}

fn add_leaf(
    level: &mut BTreeMap<u64, BumpLeaf>,
    leaf: &BumpLeaf,
    block_height: u64,
    level_index: usize,
) -> WalletResult<()> {
    match level.entry(leaf.offset) {
        Entry::Vacant(slot) => {
            slot.insert(leaf.clone());
        }
        Entry::Occupied(mut slot) => {
            let existing = slot.get_mut();
            if existing.hash != leaf.hash || existing.duplicate != leaf.duplicate {
                return Err(ProofError::InvalidProofConflict {
                    block_height,
                    level: level_index,
                    offset: leaf.offset,
                }
                .into());
            }
            existing.txid |= leaf.txid;
        }
    }
    Ok(())
}

/// Merge every height group; result is sorted by height
pub fn merge_bumps(by_height: BTreeMap<u64, Vec<Bump>>) -> WalletResult<Vec<Bump>> {
    let mut merged = Vec::with_capacity(by_height.len());
    for (height, bumps) in by_height {
        if let Some(bump) = calculate_merged_bump(&bumps)? {
            tracing::debug!(
                block_height = height,
                paths = bumps.len(),
                levels = bump.tree_height(),
                "merged merkle paths"
            );
            merged.push(bump);
        }
    }
    Ok(merged)
}

/// Bucket paths by their block height
pub fn group_by_height(bumps: impl IntoIterator<Item = Bump>) -> BTreeMap<u64, Vec<Bump>> {
    let mut by_height: BTreeMap<u64, Vec<Bump>> = BTreeMap::new();
    for bump in bumps {
        by_height.entry(bump.block_height).or_default().push(bump);
    }
    by_height
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::types::Hash256;
    use crate::errors::WalletError;

    fn h(b: u8) -> Hash256 {
        Hash256::new([b; 32])
    }

    fn bump(height: u64, index: u64, txid: u8, nodes: &[u8]) -> Bump {
        let mut level0 = vec![BumpLeaf::target(index, h(txid)), BumpLeaf::hash(index ^ 1, h(nodes[0]))];
        level0.sort_by_key(|l| l.offset);
        let mut path = vec![level0];
        for (level, node) in nodes.iter().enumerate().skip(1) {
            path.push(vec![BumpLeaf::hash((index >> level) ^ 1, h(*node))]);
        }
        Bump {
            block_height: height,
            path,
        }
    }

    #[test]
    fn test_disjoint_offsets_are_summed() {
        let a = bump(10, 0, 1, &[2, 3]);
        let b = bump(10, 4, 5, &[6, 7]);
        let merged = calculate_merged_bump(&[a.clone(), b.clone()]).unwrap().unwrap();
        for level in 0..2 {
            assert_eq!(merged.path[level].len(), a.path[level].len() + b.path[level].len());
        }
        let offsets: Vec<u64> = merged.path[0].iter().map(|l| l.offset).collect();
        assert_eq!(offsets, vec![0, 1, 4, 5]);
    }

    #[test]
    fn test_identical_leaves_are_deduplicated() {
        let a = bump(10, 0, 1, &[2, 3]);
        let merged = calculate_merged_bump(&[a.clone(), a.clone()]).unwrap().unwrap();
        assert_eq!(merged, a);
    }

    #[test]
    fn test_sibling_txids_merge_flags() {
        // each proves one side of the same pair
        let a = bump(10, 0, 1, &[2, 9]);
        let b = bump(10, 1, 2, &[1, 9]);
        let merged = calculate_merged_bump(&[a, b]).unwrap().unwrap();
        assert_eq!(merged.path[0].len(), 2);
        assert!(merged.path[0].iter().all(|l| l.txid));
        assert_eq!(merged.path[1].len(), 1);
    }

    #[test]
    fn test_conflicting_hash_fails() {
        let a = bump(10, 0, 1, &[2, 3]);
        let b = bump(10, 0, 1, &[2, 4]);
        let err = calculate_merged_bump(&[a, b]).unwrap_err();
        assert!(err.is_proof_conflict());
        assert!(matches!(
            err,
            WalletError::Proof(ProofError::InvalidProofConflict { level: 1, offset: 1, .. })
        ));
    }

    #[test]
    fn test_height_mismatch_fails() {
        let err = calculate_merged_bump(&[bump(1, 0, 1, &[2]), bump(2, 0, 1, &[2])]).unwrap_err();
        assert!(matches!(err, WalletError::Proof(ProofError::HeightMismatch { .. })));
    }

    #[test]
    fn test_depth_mismatch_fails() {
        let err =
            calculate_merged_bump(&[bump(1, 0, 1, &[2]), bump(1, 0, 1, &[2, 3])]).unwrap_err();
        assert!(matches!(err, WalletError::Proof(ProofError::TreeHeightMismatch { .. })));
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(calculate_merged_bump(&[]).unwrap(), None);
        assert_eq!(calculate_merged_bump(&[Bump::new(3), Bump::new(3)]).unwrap(), None);
    }

    #[test]
    fn test_merge_bumps_sorted_by_height() {
        let groups = group_by_height(vec![
            bump(30, 0, 1, &[2]),
            bump(10, 0, 1, &[2]),
            bump(30, 2, 5, &[6]),
            Bump::new(20),
        ]);
        let merged = merge_bumps(groups).unwrap();
        assert_eq!(merged.iter().map(|b| b.block_height).collect::<Vec<_>>(), vec![10, 30]);
        assert_eq!(merged[1].path[0].len(), 4);
    }
}
