//! Lightweight wallet libraries for BEEF proofs and draft funding
//!
//! This crate builds the pieces a light wallet service needs to hand out
//! spend-ready transactions:
//!
//! - merkle proof compaction into BUMP paths and merging per block
//! - per-owner UTXO reservation with lock-bounded concurrency
//! - draft transaction construction with fee estimation and change
//! - BEEF bundles carrying a transaction, its unmined ancestry and proofs
//!
//! ## Features
//!
//! - `storage` (default): SQLite persistence through `rusqlite`
//! - `cli`: the `beef_tool` binary
//!
//! Without the `storage` feature the engine runs against
//! [`storage::MemoryWalletStorage`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use lightweight_beef_wallet::{
//!     data_structures::{TransactionConfig, TransactionOutput},
//!     engine::{EngineContext, FundingEngine},
//! };
//!
//! # async fn run() -> lightweight_beef_wallet::WalletResult<()> {
//! let engine = FundingEngine::new(EngineContext::builder().build()?);
//! let config = TransactionConfig::new()
//!     .with_output(TransactionOutput::to_address("1BoatSLRHtKNngkdXEeobR76b53LETtpyT", 1000));
//! let draft = engine.create_draft("alice", config).await?;
//! println!("{} pays a fee of {}", draft.id, draft.configuration.fee);
//! # Ok(())
//! # }
//! ```

pub mod beef;
pub mod config;
pub mod data_structures;
pub mod destinations;
pub mod drafts;
pub mod engine;
pub mod errors;
pub mod events;
pub mod fees;
pub mod locks;
pub mod proofs;
pub mod reservation;
pub mod resolver;
pub mod storage;
pub mod tasks;
pub mod utils;

pub use beef::{Beef, BeefTx};
pub use config::EngineConfig;
pub use engine::{EngineContext, EngineContextBuilder, FundingEngine};
pub use errors::{ErrorKind, ProofError, SerializationError, WalletError, WalletResult};
pub use fees::FeeUnit;
