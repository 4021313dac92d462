//! Locking script classification and construction

use serde::{Deserialize, Serialize};

use crate::errors::{SerializationError, WalletError, WalletResult};

const OP_FALSE: u8 = 0x00;
const OP_RETURN: u8 = 0x6a;
const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_PUSHDATA4: u8 = 0x4e;

/// Mainnet P2PKH address prefix
pub const MAINNET_P2PKH_PREFIX: u8 = 0x00;
/// Testnet P2PKH address prefix
pub const TESTNET_P2PKH_PREFIX: u8 = 0x6f;

/// Standard script classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ScriptType {
    #[default]
    #[serde(rename = "pubkeyhash")]
    PubKeyHash,
    #[serde(rename = "nulldata")]
    NullData,
    #[serde(rename = "nonstandard")]
    NonStandard,
}

impl ScriptType {
    /// Classify a locking script
    pub fn detect(script: &[u8]) -> Self {
        if is_p2pkh(script) {
            ScriptType::PubKeyHash
        } else if script.first() == Some(&OP_RETURN)
            || (script.len() > 1 && script[0] == OP_FALSE && script[1] == OP_RETURN)
        {
            ScriptType::NullData
        } else {
            ScriptType::NonStandard
        }
    }

    /// Classify a hex encoded locking script; undecodable scripts are non-standard
    pub fn detect_hex(script_hex: &str) -> Self {
        hex::decode(script_hex)
            .map(|s| Self::detect(&s))
            .unwrap_or(ScriptType::NonStandard)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptType::PubKeyHash => "pubkeyhash",
            ScriptType::NullData => "nulldata",
            ScriptType::NonStandard => "nonstandard",
        }
    }

    /// Estimated size of an input spending this script type
    pub fn input_size(&self) -> u64 {
        // unlocking script of 107 bytes plus outpoint, length and sequence
        148
    }
}

impl std::fmt::Display for ScriptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ScriptType {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pubkeyhash" => Ok(ScriptType::PubKeyHash),
            "nulldata" => Ok(ScriptType::NullData),
            "nonstandard" => Ok(ScriptType::NonStandard),
            other => Err(SerializationError::InvalidData(format!("unknown script type {other}")).into()),
        }
    }
}

fn is_p2pkh(script: &[u8]) -> bool {
    script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 0x14
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
}

/// Build a P2PKH locking script for a pubkey hash
pub fn p2pkh_locking_script(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    script.push(0x14);
    script.extend_from_slice(pubkey_hash);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

/// Decode a base58check P2PKH address (mainnet or testnet) into its locking script
pub fn locking_script_from_address(address: &str) -> WalletResult<Vec<u8>> {
    let decoded = bs58::decode(address)
        .with_check(None)
        .into_vec()
        .map_err(|e| WalletError::InvalidDestination(format!("{address}: {e}")))?;
    if decoded.len() != 21 {
        return Err(WalletError::InvalidDestination(format!(
            "{address}: invalid length {}",
            decoded.len()
        )));
    }
    if decoded[0] != MAINNET_P2PKH_PREFIX && decoded[0] != TESTNET_P2PKH_PREFIX {
        return Err(WalletError::InvalidDestination(format!(
            "{address}: unsupported prefix 0x{:02x}",
            decoded[0]
        )));
    }
    let mut pkh = [0u8; 20];
    pkh.copy_from_slice(&decoded[1..21]);
    Ok(p2pkh_locking_script(&pkh))
}

/// Encode a pubkey hash as a base58check address
pub fn address_from_pubkey_hash(pubkey_hash: &[u8; 20], prefix: u8) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(prefix);
    payload.extend_from_slice(pubkey_hash);
    bs58::encode(payload).with_check().into_string()
}

/// Recover the mainnet address for a P2PKH script, if it is one
pub fn address_from_locking_script(script: &[u8]) -> Option<String> {
    if !is_p2pkh(script) {
        return None;
    }
    let mut pkh = [0u8; 20];
    pkh.copy_from_slice(&script[3..23]);
    Some(address_from_pubkey_hash(&pkh, MAINNET_P2PKH_PREFIX))
}

/// Data carried by an OP_RETURN output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OpReturn {
    /// Complete locking script in hex; takes precedence over the parts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hex: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hex_parts: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub string_parts: Vec<String>,
}

impl OpReturn {
    /// Build the `OP_FALSE OP_RETURN <push>...` locking script
    pub fn locking_script(&self) -> WalletResult<Vec<u8>> {
        if let Some(script_hex) = &self.hex {
            return Ok(hex::decode(script_hex)?);
        }
        let mut script = vec![OP_FALSE, OP_RETURN];
        for part in &self.hex_parts {
            push_data(&mut script, &hex::decode(part)?);
        }
        for part in &self.string_parts {
            push_data(&mut script, part.as_bytes());
        }
        Ok(script)
    }
}

fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    let len = data.len();
    if len < OP_PUSHDATA1 as usize {
        script.push(len as u8);
    } else if len <= 0xff {
        script.push(OP_PUSHDATA1);
        script.push(len as u8);
    } else if len <= 0xffff {
        script.push(OP_PUSHDATA2);
        script.extend_from_slice(&(len as u16).to_le_bytes());
    } else {
        script.push(OP_PUSHDATA4);
        script.extend_from_slice(&(len as u32).to_le_bytes());
    }
    script.extend_from_slice(data);
}
