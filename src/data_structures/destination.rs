use serde::{Deserialize, Serialize};

/// External (receive) derivation chain
pub const CHAIN_EXTERNAL: u32 = 0;
/// Internal (change) derivation chain
pub const CHAIN_INTERNAL: u32 = 1;

/// A locking script owned by an account, with the derivation info needed to sign for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub id: String,
    pub owner_id: String,
    pub chain: u32,
    pub num: u32,
    pub address: String,
    /// Locking script in hex
    pub locking_script: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_id: Option<String>,
}
