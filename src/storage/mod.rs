//! Storage abstraction layer for UTXOs, transactions and drafts
//!
//! This module provides a trait-based storage system so the funding engine can
//! run against different backends. An in-memory store is always available;
//! SQLite support is behind the `storage` feature.

pub mod memory;
#[cfg(feature = "storage")]
pub mod sqlite;
pub mod storage_trait;
pub mod utxo_status;

pub use memory::{MemoryFailureModes, MemoryWalletStorage};
#[cfg(feature = "storage")]
pub use sqlite::SqliteWalletStorage;
pub use storage_trait::{DraftQuery, TransactionLookup, UtxoQuery, WalletStorage};
pub use utxo_status::UtxoStatus;
