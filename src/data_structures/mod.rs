//! Data structures for UTXOs, transactions, proofs and drafts

pub mod bump;
pub mod destination;
pub mod draft_transaction;
pub mod merkle_proof;
pub mod recorded_transaction;
pub mod script;
pub mod transaction;
pub mod types;
pub mod utxo;

pub use bump::{Bump, BumpLeaf};
pub use destination::Destination;
pub use draft_transaction::{
    ChangeStrategy, DraftStatus, DraftTransaction, ScriptOutput, TransactionConfig,
    TransactionInput, TransactionOutput,
};
pub use merkle_proof::MerkleProof;
pub use recorded_transaction::RecordedTransaction;
pub use script::{OpReturn, ScriptType};
pub use transaction::{Transaction, TxInput, TxOutput};
pub use types::{Hash256, UtxoPointer};
pub use utxo::Utxo;
