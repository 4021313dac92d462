//! Change destinations and ownership of locking scripts
//!
//! The builder needs two things from the key side of a wallet: a fresh
//! destination for each change output, and the destination behind every
//! input script so the draft carries what a signer needs.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::data_structures::{
    destination::{Destination, CHAIN_EXTERNAL, CHAIN_INTERNAL},
    script::{address_from_locking_script, address_from_pubkey_hash, p2pkh_locking_script, MAINNET_P2PKH_PREFIX},
};
use crate::errors::WalletResult;
use crate::utils::sha256;

#[async_trait]
pub trait ChangeDestinationProvider: Send + Sync {
    /// A new, unused destination for change of `draft_id`
    async fn new_change_destination(&self, owner_id: &str, draft_id: &str) -> WalletResult<Destination>;

    /// The owner's destination that locks with `locking_script` (hex)
    async fn destination_for_script(
        &self,
        owner_id: &str,
        locking_script: &str,
    ) -> WalletResult<Option<Destination>>;
}

#[derive(Debug, Default)]
struct DestinationState {
    /// (owner, locking script) -> destination
    by_script: HashMap<(String, String), Destination>,
    next_internal: HashMap<String, u32>,
}

/// In-memory destination registry with deterministic change derivation
#[derive(Debug, Default)]
pub struct MemoryDestinationStore {
    state: Mutex<DestinationState>,
}

impl MemoryDestinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a destination as belonging to its owner
    pub async fn register(&self, destination: Destination) {
        let key = (destination.owner_id.clone(), destination.locking_script.clone());
        self.state.lock().await.by_script.insert(key, destination);
    }

    /// Record an external destination for `locking_script` (hex)
    pub async fn register_script(&self, owner_id: &str, locking_script: &str) -> Destination {
        let mut state = self.state.lock().await;
        let num = state
            .by_script
            .keys()
            .filter(|(owner, _)| owner == owner_id)
            .count() as u32;
        let destination = Destination {
            id: destination_id(locking_script),
            owner_id: owner_id.to_string(),
            chain: CHAIN_EXTERNAL,
            num,
            address: hex::decode(locking_script)
                .ok()
                .and_then(|s| address_from_locking_script(&s))
                .unwrap_or_default(),
            locking_script: locking_script.to_string(),
            draft_id: None,
        };
        state.by_script.insert(
            (owner_id.to_string(), locking_script.to_string()),
            destination.clone(),
        );
        destination
    }
}

fn destination_id(locking_script: &str) -> String {
    hex::encode(sha256(locking_script.as_bytes()))
}

/// Change pubkey hash for `(owner, num)` on the internal chain
fn internal_pubkey_hash(owner_id: &str, num: u32) -> [u8; 20] {
    let mut preimage = owner_id.as_bytes().to_vec();
    preimage.extend_from_slice(b"internal");
    preimage.extend_from_slice(&num.to_le_bytes());
    let digest = sha256(&preimage);
    let mut pkh = [0u8; 20];
    pkh.copy_from_slice(&digest[..20]);
    pkh
}

#[async_trait]
impl ChangeDestinationProvider for MemoryDestinationStore {
    async fn new_change_destination(&self, owner_id: &str, draft_id: &str) -> WalletResult<Destination> {
        let mut state = self.state.lock().await;
        let counter = state.next_internal.entry(owner_id.to_string()).or_insert(0);
        let num = *counter;
        *counter += 1;

        let pkh = internal_pubkey_hash(owner_id, num);
        let locking_script = hex::encode(p2pkh_locking_script(&pkh));
        let destination = Destination {
            id: destination_id(&locking_script),
            owner_id: owner_id.to_string(),
            chain: CHAIN_INTERNAL,
            num,
            address: address_from_pubkey_hash(&pkh, MAINNET_P2PKH_PREFIX),
            locking_script: locking_script.clone(),
            draft_id: Some(draft_id.to_string()),
        };
        state
            .by_script
            .insert((owner_id.to_string(), locking_script), destination.clone());
        tracing::debug!(owner = owner_id, num, "derived change destination");
        Ok(destination)
    }

    async fn destination_for_script(
        &self,
        owner_id: &str,
        locking_script: &str,
    ) -> WalletResult<Option<Destination>> {
        Ok(self
            .state
            .lock()
            .await
            .by_script
            .get(&(owner_id.to_string(), locking_script.to_string()))
            .cloned())
    }
}
