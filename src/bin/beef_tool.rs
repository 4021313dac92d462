//! BEEF / BUMP command line tool
//!
//! ## Usage
//! ```bash
//! # Compact one or more TSC merkle proofs of the same block into a BUMP
//! cargo run --bin beef_tool --features cli -- compact --proofs proofs.json --height 813706
//!
//! # Bundle a transaction and its unmined ancestry into BEEF
//! cargo run --bin beef_tool --features cli -- encode --transactions txs.json --root <txid>
//! ```
//!
//! `proofs.json` holds a single proof object or an array of them.
//! `txs.json` holds an array of recorded transactions: `id`, `hex` and
//! optionally `block_height` with a `bump` or `merkle_proof`.

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use lightweight_beef_wallet::{
    beef,
    data_structures::{MerkleProof, RecordedTransaction},
    errors::{WalletError, WalletResult},
    proofs::compact_path,
    storage::{MemoryWalletStorage, WalletStorage},
};
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Command {
    /// Merkle proofs (JSON) to BUMP hex
    Compact {
        #[arg(long, help = "File with one proof or an array of proofs")]
        proofs: PathBuf,
        #[arg(long, help = "Block height the proofs belong to")]
        height: u64,
    },
    /// Transaction set (JSON) plus root txid to BEEF hex
    Encode {
        #[arg(long, help = "File with an array of recorded transactions")]
        transactions: PathBuf,
        #[arg(long, help = "Txid of the transaction to bundle")]
        root: String,
    },
}

#[cfg(feature = "cli")]
fn read_json(path: &PathBuf) -> WalletResult<serde_json::Value> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(feature = "cli")]
fn compact(proofs: &PathBuf, height: u64) -> WalletResult<String> {
    let proofs: Vec<MerkleProof> = match read_json(proofs)? {
        value @ serde_json::Value::Array(_) => serde_json::from_value(value)?,
        value => vec![serde_json::from_value(value)?],
    };
    compact_path(&proofs, height)?.to_hex()
}

#[cfg(feature = "cli")]
async fn encode(transactions: &PathBuf, root: &str) -> WalletResult<String> {
    let records: Vec<RecordedTransaction> = serde_json::from_value(read_json(transactions)?)?;
    let storage = MemoryWalletStorage::new();
    for record in &records {
        storage.save_transaction(record).await?;
    }
    let root = storage
        .get_transaction_by_id(root)
        .await?
        .ok_or_else(|| WalletError::ResourceNotFound(format!("root transaction {root}")))?;
    beef::encode_hex(&root, &storage).await
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> WalletResult<()> {
    tracing_subscriber::fmt::init();

    let args = CliArgs::parse();
    let output = match args.command {
        Command::Compact { proofs, height } => compact(&proofs, height)?,
        Command::Encode { transactions, root } => encode(&transactions, &root).await?,
    };
    println!("{output}");
    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("This binary requires the 'cli' feature to be enabled.");
    eprintln!("Run with: cargo run --bin beef_tool --features cli");
    std::process::exit(1);
}
