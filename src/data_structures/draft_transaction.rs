//! Draft transaction model and its configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::data_structures::{
    bump::Bump,
    destination::Destination,
    script::{OpReturn, ScriptType},
    types::UtxoPointer,
    utxo::Utxo,
};
use crate::fees::FeeUnit;

/// Draft lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    Draft,
    Complete,
    Expired,
    Canceled,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftStatus::Draft => "draft",
            DraftStatus::Complete => "complete",
            DraftStatus::Expired => "expired",
            DraftStatus::Canceled => "canceled",
        }
    }
}

impl From<u32> for DraftStatus {
    fn from(value: u32) -> Self {
        match value {
            0 => DraftStatus::Draft,
            1 => DraftStatus::Complete,
            2 => DraftStatus::Expired,
            3 => DraftStatus::Canceled,
            _ => DraftStatus::Draft,
        }
    }
}

impl From<DraftStatus> for u32 {
    fn from(status: DraftStatus) -> Self {
        status as u32
    }
}

/// How change is split across new change destinations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStrategy {
    /// Even split, remainder to the last destination
    #[default]
    Default,
    /// Each destination gets 0.75-1.25 of the even share, remainder to the last
    Random,
    /// Reserved
    Nominations,
}

/// One on-chain script produced for an output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptOutput {
    #[serde(default)]
    pub address: String,
    pub satoshis: u64,
    /// Locking script in hex
    pub script: String,
    pub script_type: ScriptType,
}

impl ScriptOutput {
    pub fn script_len(&self) -> u64 {
        (self.script.len() / 2) as u64
    }
}

/// A requested output. It fans out into one or more scripts once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TransactionOutput {
    /// Address, paymail or empty when `script`/`op_return` is used
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub satoshis: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_return: Option<OpReturn>,
    /// Raw locking script in hex
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default)]
    pub use_for_change: bool,
    #[serde(default)]
    pub scripts: Vec<ScriptOutput>,
}

impl TransactionOutput {
    pub fn to_address(to: impl Into<String>, satoshis: u64) -> Self {
        Self {
            to: to.into(),
            satoshis,
            ..Default::default()
        }
    }

    pub fn to_script(script_hex: impl Into<String>, satoshis: u64) -> Self {
        Self {
            script: Some(script_hex.into()),
            satoshis,
            ..Default::default()
        }
    }

    pub fn op_return(op_return: OpReturn) -> Self {
        Self {
            op_return: Some(op_return),
            ..Default::default()
        }
    }

    pub fn is_op_return(&self) -> bool {
        self.op_return.is_some()
            || self
                .scripts
                .iter()
                .any(|s| s.script_type == ScriptType::NullData)
    }
}

/// A funding input with the destination needed to sign it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub utxo: Utxo,
    pub destination: Destination,
}

/// Draft request plus everything the builder filled in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TransactionConfig {
    #[serde(default)]
    pub outputs: Vec<TransactionOutput>,
    /// Sweep every spendable P2PKH UTXO to this output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_all_to: Option<TransactionOutput>,
    /// UTXOs that must be spent regardless of selection
    #[serde(default)]
    pub include_utxos: Vec<UtxoPointer>,
    /// Restrict selection to these UTXOs
    #[serde(default)]
    pub from_utxos: Vec<UtxoPointer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_unit: Option<FeeUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<Duration>,
    #[serde(default)]
    pub change_strategy: ChangeStrategy,
    #[serde(default)]
    pub change_number_of_destinations: usize,
    #[serde(default)]
    pub change_minimum_satoshis: u64,

    #[serde(default)]
    pub inputs: Vec<TransactionInput>,
    #[serde(default)]
    pub change_destinations: Vec<Destination>,
    #[serde(default)]
    pub change_satoshis: u64,
    #[serde(default)]
    pub fee: u64,
}

impl TransactionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, output: TransactionOutput) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn with_send_all_to(mut self, output: TransactionOutput) -> Self {
        self.send_all_to = Some(output);
        self
    }

    pub fn with_fee_unit(mut self, fee_unit: FeeUnit) -> Self {
        self.fee_unit = Some(fee_unit);
        self
    }

    pub fn with_change_strategy(mut self, strategy: ChangeStrategy) -> Self {
        self.change_strategy = strategy;
        self
    }

    pub fn with_change_destinations(mut self, count: usize, minimum_satoshis: u64) -> Self {
        self.change_number_of_destinations = count;
        self.change_minimum_satoshis = minimum_satoshis;
        self
    }

    pub fn with_include_utxos(mut self, pointers: Vec<UtxoPointer>) -> Self {
        self.include_utxos = pointers;
        self
    }

    pub fn with_from_utxos(mut self, pointers: Vec<UtxoPointer>) -> Self {
        self.from_utxos = pointers;
        self
    }

    pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_in = Some(expires_in);
        self
    }

    /// Sum of requested outputs, excluding change
    pub fn total_output_satoshis(&self) -> u64 {
        self.outputs.iter().map(|o| o.satoshis).sum()
    }

    pub fn total_input_satoshis(&self) -> u64 {
        self.inputs.iter().map(|i| i.utxo.satoshis).sum()
    }

    pub fn contains_op_return(&self) -> bool {
        self.outputs.iter().any(|o| o.is_op_return())
    }
}

/// An unsigned transaction proposal holding reserved funding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftTransaction {
    pub id: String,
    pub owner_id: String,
    /// ms since the epoch
    pub created_at: u64,
    /// ms since the epoch
    pub expires_at: u64,
    pub status: DraftStatus,
    pub configuration: TransactionConfig,
    /// Unsigned transaction in hex
    pub hex: String,
    #[serde(default)]
    pub bumps: Vec<Bump>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_tx_id: Option<String>,
}

impl DraftTransaction {
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        self.status == DraftStatus::Draft && self.expires_at <= now_ms
    }
}
