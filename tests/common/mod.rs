//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use tokio::sync::Mutex;

use lightweight_beef_wallet::{
    config::EngineConfig,
    data_structures::{
        script::{address_from_pubkey_hash, p2pkh_locking_script, MAINNET_P2PKH_PREFIX},
        Transaction, Utxo, UtxoPointer,
    },
    destinations::MemoryDestinationStore,
    engine::{EngineContext, FundingEngine},
    events::{DraftEvent, EventType, MemoryListener},
    resolver::DestinationResolver,
    storage::{MemoryWalletStorage, UtxoQuery, WalletStorage},
    FeeUnit,
};

pub const OWNER: &str = "alice";

/// Engine wired to in-memory collaborators the test can inspect
pub struct Harness {
    pub engine: FundingEngine,
    pub storage: Arc<MemoryWalletStorage>,
    pub destinations: Arc<MemoryDestinationStore>,
    pub events: Arc<Mutex<Vec<DraftEvent>>>,
}

impl Harness {
    pub fn new(fee_unit: FeeUnit) -> Self {
        Self::with_config(EngineConfig::new().with_fee_unit(fee_unit))
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::assemble(config, None)
    }

    /// Engine whose outputs resolve through `resolver`
    pub fn with_resolver(fee_unit: FeeUnit, resolver: Arc<dyn DestinationResolver>) -> Self {
        Self::assemble(EngineConfig::new().with_fee_unit(fee_unit), Some(resolver))
    }

    fn assemble(config: EngineConfig, resolver: Option<Arc<dyn DestinationResolver>>) -> Self {
        let storage = Arc::new(MemoryWalletStorage::new());
        let destinations = Arc::new(MemoryDestinationStore::new());
        let listener = MemoryListener::new();
        let events = listener.events();
        let mut builder = EngineContext::builder()
            .with_storage(storage.clone())
            .with_destinations(destinations.clone())
            .with_listener(Box::new(listener))
            .with_config(config);
        if let Some(resolver) = resolver {
            builder = builder.with_resolver(resolver);
        }
        let ctx = builder.build().unwrap();
        Self {
            engine: FundingEngine::new(ctx),
            storage,
            destinations,
            events,
        }
    }

    /// Store a spendable P2PKH UTXO of `owner` at a script the owner controls
    pub async fn fund(&self, owner: &str, seed: u8, satoshis: u64) -> Utxo {
        let script = hex::encode(p2pkh_locking_script(&[seed; 20]));
        self.destinations.register_script(owner, &script).await;
        let utxo = Utxo::new(owner, UtxoPointer::new(hex::encode([seed; 32]), 0), script, satoshis);
        self.storage.save_utxo(&utxo).await.unwrap();
        utxo
    }

    pub async fn utxos(&self, owner: &str) -> Vec<Utxo> {
        self.storage
            .get_utxos(&UtxoQuery::for_owner(owner).unwrap())
            .await
            .unwrap()
    }

    pub async fn reserved(&self, owner: &str) -> Vec<Utxo> {
        self.utxos(owner)
            .await
            .into_iter()
            .filter(|u| u.draft_id.is_some() && u.spending_tx_id.is_none())
            .collect()
    }

    pub async fn event_types(&self) -> Vec<&'static str> {
        self.events.lock().await.iter().map(|e| e.event_type()).collect()
    }
}

/// A mainnet P2PKH address nobody in the tests owns
pub fn external_address(seed: u8) -> String {
    address_from_pubkey_hash(&[seed; 20], MAINNET_P2PKH_PREFIX)
}

/// Put a dummy unlocking script on every input of an unsigned draft
pub fn sign(unsigned_hex: &str) -> String {
    let mut tx = Transaction::from_hex(unsigned_hex).unwrap();
    for input in tx.inputs.iter_mut() {
        input.unlocking_script = vec![0x51; 107];
    }
    tx.to_hex().unwrap()
}
