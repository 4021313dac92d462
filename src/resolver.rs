//! Output destination resolution
//!
//! Turns the `to` field of a requested output into locking scripts. Paymail
//! and other negotiated destinations plug in through [`DestinationResolver`].

use async_trait::async_trait;

use crate::data_structures::{
    draft_transaction::ScriptOutput,
    script::{locking_script_from_address, ScriptType},
};
use crate::errors::{WalletError, WalletResult};

#[async_trait]
pub trait DestinationResolver: Send + Sync {
    /// Scripts that together pay `satoshis` to `to`
    async fn resolve(&self, to: &str, satoshis: u64) -> WalletResult<Vec<ScriptOutput>>;
}

/// Resolves base58check P2PKH addresses
#[derive(Debug, Default, Clone, Copy)]
pub struct AddressResolver;

impl AddressResolver {
    pub fn new() -> Self {
        Self
    }
}

fn is_paymail(to: &str) -> bool {
    to.split_once('@')
        .map(|(alias, domain)| !alias.is_empty() && domain.contains('.'))
        .unwrap_or(false)
}

#[async_trait]
impl DestinationResolver for AddressResolver {
    async fn resolve(&self, to: &str, satoshis: u64) -> WalletResult<Vec<ScriptOutput>> {
        if to.trim().is_empty() {
            return Err(WalletError::InvalidDestination("empty destination".to_string()));
        }
        if is_paymail(to) {
            return Err(WalletError::InvalidDestination(format!(
                "{to}: paymail destinations need an external resolver"
            )));
        }
        let script = locking_script_from_address(to)?;
        Ok(vec![ScriptOutput {
            address: to.to_string(),
            satoshis,
            script: hex::encode(script),
            script_type: ScriptType::PubKeyHash,
        }])
    }
}
