//! Builds BEEF bundles by walking a transaction's unmined ancestry

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::beef::format::{Beef, BeefTx};
use crate::data_structures::{
    bump::Bump, recorded_transaction::RecordedTransaction, transaction::Transaction,
    types::Hash256,
};
use crate::errors::{ProofError, WalletError, WalletResult};
use crate::proofs::{group_by_height, merge_bumps};
use crate::storage::TransactionLookup;

/// One transaction collected by the walk
struct Collected {
    tx: Transaction,
    /// Merkle path when mined; mined transactions end the walk
    bump: Option<Bump>,
}

/// Encode `root` with every ancestor needed to reach a mined transaction.
///
/// The walk goes through the inputs of unmined transactions, stopping at
/// mined ones. An ancestor the lookup does not know fails the encoding.
pub async fn encode<L: TransactionLookup + ?Sized>(
    root: &RecordedTransaction,
    lookup: &L,
) -> WalletResult<Beef> {
    let collected = collect_ancestry(root, lookup).await?;
    let order = parents_first(&collected);

    let bumps = merge_bumps(group_by_height(
        collected.values().filter_map(|c| c.bump.clone()),
    ))?;

    let mut transactions = Vec::with_capacity(order.len());
    for txid in order {
        let Some(entry) = collected.get(&txid) else {
            continue;
        };
        let bump_index = match &entry.bump {
            Some(bump) => Some(bump_index_for(&bumps, bump.block_height, &txid)?),
            None => None,
        };
        transactions.push(BeefTx {
            tx: entry.tx.clone(),
            bump_index,
        });
    }

    tracing::debug!(
        root = %root.id,
        transactions = transactions.len(),
        bumps = bumps.len(),
        "encoded beef"
    );
    Ok(Beef {
        bumps,
        transactions,
        ..Beef::default()
    })
}

/// Hex of [`encode`]
pub async fn encode_hex<L: TransactionLookup + ?Sized>(
    root: &RecordedTransaction,
    lookup: &L,
) -> WalletResult<String> {
    encode(root, lookup).await?.to_hex()
}

async fn collect_ancestry<L: TransactionLookup + ?Sized>(
    root: &RecordedTransaction,
    lookup: &L,
) -> WalletResult<HashMap<Hash256, Collected>> {
    let mut collected = HashMap::new();
    let mut pending = vec![root.clone()];

    while let Some(record) = pending.pop() {
        let tx = record.transaction()?;
        let txid = tx.txid()?;
        if collected.contains_key(&txid) {
            continue;
        }
        let bump = record.proof_bump()?;
        if bump.is_none() {
            for input in &tx.inputs {
                let parent_id = input.prev_txid;
                if collected.contains_key(&parent_id) {
                    continue;
                }
                let parent = lookup
                    .get_transaction(&parent_id.to_hex())
                    .await?
                    .ok_or_else(|| WalletError::UnresolvableAncestor(parent_id.to_hex()))?;
                pending.push(parent);
            }
        }
        collected.insert(txid, Collected { tx, bump });
    }
    Ok(collected)
}

/// Kahn's algorithm over the collected set; ties go to the smaller txid
fn parents_first(collected: &HashMap<Hash256, Collected>) -> Vec<Hash256> {
    let mut children: HashMap<Hash256, Vec<Hash256>> = HashMap::new();
    let mut in_degree: HashMap<Hash256, usize> = HashMap::new();

    for (txid, entry) in collected {
        in_degree.entry(*txid).or_insert(0);
        if entry.bump.is_some() {
            continue;
        }
        let parents: HashSet<Hash256> = entry
            .tx
            .inputs
            .iter()
            .map(|i| i.prev_txid)
            .filter(|p| collected.contains_key(p))
            .collect();
        for parent in parents {
            children.entry(parent).or_default().push(*txid);
            *in_degree.entry(*txid).or_insert(0) += 1;
        }
    }

    let mut ready: BTreeSet<Hash256> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(txid, _)| *txid)
        .collect();
    let mut order = Vec::with_capacity(collected.len());
    while let Some(txid) = ready.pop_first() {
        order.push(txid);
        for child in children.get(&txid).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(child) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(*child);
                }
            }
        }
    }
    order
}

fn bump_index_for(bumps: &[Bump], block_height: u64, txid: &Hash256) -> WalletResult<u64> {
    bumps
        .iter()
        .position(|b| b.block_height == block_height && b.contains_txid(txid))
        .map(|i| i as u64)
        .ok_or_else(|| ProofError::LeafNotFound(txid.to_hex()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::{
        bump::BumpLeaf,
        transaction::{TxInput, TxOutput},
        types::UtxoPointer,
    };
    use crate::storage::{MemoryWalletStorage, WalletStorage};

    fn spend(prevs: &[(Hash256, u32)], satoshis: u64) -> Transaction {
        let mut tx = Transaction::new();
        for (prev, vout) in prevs {
            tx.inputs
                .push(TxInput::unsigned(&UtxoPointer::new(prev.to_hex(), *vout)).unwrap());
        }
        tx.outputs.push(TxOutput {
            satoshis,
            locking_script: vec![0x51],
        });
        tx.outputs.push(TxOutput {
            satoshis,
            locking_script: vec![0x52],
        });
        tx
    }

    fn mined(tx: &Transaction, height: u64, index: u64) -> RecordedTransaction {
        let txid = tx.txid().unwrap();
        let sibling = BumpLeaf::hash(index ^ 1, Hash256::new([0xee; 32]));
        let mut level = vec![BumpLeaf::target(index, txid), sibling];
        level.sort_by_key(|l| l.offset);
        RecordedTransaction::from_transaction(tx).unwrap().with_bump(Bump {
            block_height: height,
            path: vec![level],
        })
    }

    fn unmined(tx: &Transaction) -> RecordedTransaction {
        RecordedTransaction::from_transaction(tx).unwrap()
    }

    #[tokio::test]
    async fn test_mined_root_is_alone() {
        let storage = MemoryWalletStorage::new();
        let tx = spend(&[(Hash256::new([1; 32]), 0)], 10);
        let beef = encode(&mined(&tx, 100, 0), &storage).await.unwrap();
        assert_eq!(beef.transactions.len(), 1);
        assert_eq!(beef.transactions[0].bump_index, Some(0));
        assert_eq!(beef.bumps.len(), 1);
    }

    #[tokio::test]
    async fn test_shared_parent_deduplicated_and_first() {
        let storage = MemoryWalletStorage::new();
        let grand = spend(&[(Hash256::new([1; 32]), 0)], 1000);
        let grand_id = grand.txid().unwrap();
        storage.save_transaction(&mined(&grand, 100, 0)).await.unwrap();

        let parent = spend(&[(grand_id, 0)], 900);
        let parent_id = parent.txid().unwrap();
        storage.save_transaction(&unmined(&parent)).await.unwrap();

        // Both outputs of the unmined parent feed the root
        let root = spend(&[(parent_id, 0), (parent_id, 1)], 1700);
        let beef = encode(&unmined(&root), &storage).await.unwrap();

        let ids: Vec<Hash256> = beef
            .transactions
            .iter()
            .map(|t| t.tx.txid().unwrap())
            .collect();
        assert_eq!(ids, vec![grand_id, parent_id, root.txid().unwrap()]);
        assert_eq!(beef.transactions[0].bump_index, Some(0));
        assert_eq!(beef.transactions[1].bump_index, None);
        beef.validate_ancestry().unwrap();
    }

    #[tokio::test]
    async fn test_same_height_paths_share_one_bump() {
        let storage = MemoryWalletStorage::new();
        let a = spend(&[(Hash256::new([1; 32]), 0)], 1000);
        let b = spend(&[(Hash256::new([2; 32]), 0)], 1000);
        storage.save_transaction(&mined(&a, 100, 0)).await.unwrap();
        storage.save_transaction(&mined(&b, 100, 2)).await.unwrap();

        let root = spend(&[(a.txid().unwrap(), 0), (b.txid().unwrap(), 0)], 1500);
        let beef = encode(&unmined(&root), &storage).await.unwrap();

        assert_eq!(beef.bumps.len(), 1);
        assert!(beef.transactions[..2]
            .iter()
            .all(|t| t.bump_index == Some(0)));
        let decoded = Beef::from_bytes(&beef.to_bytes().unwrap()).unwrap();
        decoded.validate_ancestry().unwrap();
    }

    #[tokio::test]
    async fn test_unknown_ancestor_fails() {
        let storage = MemoryWalletStorage::new();
        let missing = Hash256::new([4; 32]);
        let root = spend(&[(missing, 0)], 10);
        let err = encode(&unmined(&root), &storage).await.unwrap_err();
        assert!(matches!(err, WalletError::UnresolvableAncestor(id) if id == missing.to_hex()));
    }

    #[tokio::test]
    async fn test_hex_starts_with_version() {
        let storage = MemoryWalletStorage::new();
        let tx = spend(&[(Hash256::new([1; 32]), 0)], 10);
        let beef_hex = encode_hex(&mined(&tx, 5, 1), &storage).await.unwrap();
        assert!(beef_hex.starts_with("0100beef"));
    }
}
