//! Error types for the funding engine and proof encoders
//!
//! Every fallible operation in the crate returns [`WalletResult`]. Variants are
//! grouped into four categories (see [`ErrorKind`]) so callers can decide
//! whether to report, retry or escalate without matching every variant.

use thiserror::Error;

/// Result alias used across the crate
pub type WalletResult<T> = Result<T, WalletError>;

/// Broad error category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad configuration or destination; nothing was attempted
    Validation,
    /// Funds or UTXO contention; partial reservations were released
    Resource,
    /// Logic bug or tampered input; never retried
    InvariantViolation,
    /// Store, lock or resolver failure, propagated with context
    Dependency,
}

/// Errors raised while compacting, merging or verifying merkle paths
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProofError {
    #[error("Conflicting hash at block {block_height}, level {level}, offset {offset}")]
    InvalidProofConflict {
        block_height: u64,
        level: usize,
        offset: u64,
    },
    #[error("Cannot merge paths with different heights: expected {expected}, found {found}")]
    HeightMismatch { expected: u64, found: u64 },
    #[error("Cannot merge paths of different depth at block {block_height}: {expected} vs {found} levels")]
    TreeHeightMismatch {
        block_height: u64,
        expected: usize,
        found: usize,
    },
    #[error("Invalid leaf flags: {0}")]
    InvalidFlags(u8),
    #[error("Non-canonical varint encoding of {0}")]
    InvalidVarInt(u64),
    #[error("Invalid merkle node: {0}")]
    InvalidNode(String),
    #[error("Transaction {0} is not a leaf of this path")]
    LeafNotFound(String),
    #[error("Missing sibling at level {level}, offset {offset}")]
    MissingSibling { level: usize, offset: u64 },
}

/// Encoding and decoding failures
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("Hex decoding failed: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Base58 decoding failed: {0}")]
    Base58(String),
    #[error("Unexpected end of data: {0}")]
    UnexpectedEof(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl From<std::io::Error> for SerializationError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof => SerializationError::UnexpectedEof(e.to_string()),
            _ => SerializationError::InvalidData(e.to_string()),
        }
    }
}

/// Top level error for all engine operations
#[derive(Debug, Error)]
pub enum WalletError {
    // Validation
    #[error("Transaction has no outputs")]
    MissingTransactionOutputs,
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),
    #[error("Output value too low: {0}")]
    OutputValueTooLow(String),
    #[error("Invalid OP_RETURN output: {0}")]
    InvalidOpReturnOutput(String),
    #[error("Invalid fee unit: {0}")]
    InvalidFeeUnit(String),
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    #[error("Invalid draft state: {0}")]
    InvalidDraftState(String),

    // Resource
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("UTXO not found: {0}")]
    MissingUtxo(String),
    #[error("UTXO unavailable: {0}")]
    UtxoUnavailable(String),
    #[error("No destination for locking script: {0}")]
    MissingDestination(String),
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    // Invariant violations
    #[error("UTXO used more than once: {0}")]
    DuplicateUtxo(String),
    #[error("Outputs ({outputs}) exceed inputs ({inputs})")]
    OutputValueTooHigh { inputs: u64, outputs: u64 },
    #[error("Invalid fee {fee}: inputs {inputs}, outputs {outputs}")]
    InvalidFee { fee: u64, inputs: u64, outputs: u64 },
    #[error("Proof error: {0}")]
    Proof(#[from] ProofError),
    #[error("Ancestor {0} is neither known nor mined")]
    UnresolvableAncestor(String),
    #[error("Transaction does not match draft: {0}")]
    TransactionMismatch(String),

    // Dependencies
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Lock error: {0}")]
    LockError(String),
    #[error("Timed out waiting for lock: {0}")]
    LockTimeout(String),
    #[error("Destination resolver error: {0}")]
    ResolverError(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),
}

impl WalletError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        use WalletError::*;
        match self {
            MissingTransactionOutputs
            | InvalidDestination(_)
            | OutputValueTooLow(_)
            | InvalidOpReturnOutput(_)
            | InvalidFeeUnit(_)
            | InvalidQuery(_)
            | InvalidConfiguration(_)
            | NotImplemented(_)
            | InvalidDraftState(_)
            | Serialization(_) => ErrorKind::Validation,
            InsufficientFunds(_)
            | MissingUtxo(_)
            | UtxoUnavailable(_)
            | MissingDestination(_)
            | ResourceNotFound(_) => ErrorKind::Resource,
            DuplicateUtxo(_)
            | OutputValueTooHigh { .. }
            | InvalidFee { .. }
            | Proof(_)
            | UnresolvableAncestor(_)
            | TransactionMismatch(_) => ErrorKind::InvariantViolation,
            StorageError(_) | LockError(_) | LockTimeout(_) | ResolverError(_) => {
                ErrorKind::Dependency
            }
        }
    }

    /// Whether this is a proof conflict between two merkle paths
    pub fn is_proof_conflict(&self) -> bool {
        matches!(
            self,
            WalletError::Proof(
                ProofError::InvalidProofConflict { .. } | ProofError::TreeHeightMismatch { .. }
            )
        )
    }
}

impl From<hex::FromHexError> for WalletError {
    fn from(e: hex::FromHexError) -> Self {
        WalletError::Serialization(SerializationError::Hex(e))
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(e: serde_json::Error) -> Self {
        WalletError::Serialization(SerializationError::Json(e))
    }
}

impl From<std::io::Error> for WalletError {
    fn from(e: std::io::Error) -> Self {
        WalletError::Serialization(SerializationError::from(e))
    }
}
