//! Fee rates and the byte size model used to estimate fees

use serde::{Deserialize, Serialize};

use crate::data_structures::script::ScriptType;
use crate::errors::{WalletError, WalletResult};
use crate::utils::varint_size;

/// Version and lock time
pub const TX_OVERHEAD_SIZE: u64 = 8;
/// Size budgeted for each change output
pub const CHANGE_OUTPUT_SIZE: u64 = 35;
/// Outputs at or below this value are uneconomical
pub const DUST_LIMIT: u64 = 1;

/// Fee rate of `satoshis` per `bytes`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeUnit {
    pub satoshis: u64,
    pub bytes: u64,
}

impl Default for FeeUnit {
    fn default() -> Self {
        Self {
            satoshis: 1,
            bytes: 20,
        }
    }
}

impl FeeUnit {
    pub fn new(satoshis: u64, bytes: u64) -> Self {
        Self { satoshis, bytes }
    }

    pub fn validate(&self) -> WalletResult<()> {
        if self.bytes == 0 {
            return Err(WalletError::InvalidFeeUnit(
                "fee unit bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// `ceil(size * satoshis / bytes)`
    pub fn fee_for_size(&self, size: u64) -> u64 {
        if self.bytes == 0 {
            return 0;
        }
        (size * self.satoshis).div_ceil(self.bytes)
    }
}

/// Size of an output carrying a `script_len` byte locking script
pub fn output_size(script_len: u64) -> u64 {
    8 + varint_size(script_len) + script_len
}

/// Estimated serialized size of a transaction
pub fn estimate_size(inputs: &[ScriptType], output_script_lens: &[u64]) -> u64 {
    let mut size = TX_OVERHEAD_SIZE;
    size += varint_size(inputs.len() as u64);
    size += inputs.iter().map(|t| t.input_size()).sum::<u64>();
    size += varint_size(output_script_lens.len() as u64);
    size += output_script_lens
        .iter()
        .map(|len| output_size(*len))
        .sum::<u64>();
    size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_rounds_up() {
        let unit = FeeUnit::new(5, 100);
        assert_eq!(unit.fee_for_size(192), 10);
        assert_eq!(unit.fee_for_size(200), 10);
        assert_eq!(unit.fee_for_size(201), 11);
        assert_eq!(FeeUnit::default().fee_for_size(636), 32);
    }

    #[test]
    fn test_zero_byte_unit_is_invalid() {
        assert!(FeeUnit::new(1, 0).validate().is_err());
        assert_eq!(FeeUnit::new(1, 0).fee_for_size(100), 0);
        assert!(FeeUnit::default().validate().is_ok());
    }

    #[test]
    fn test_estimate_size_p2pkh() {
        // one p2pkh input paying one p2pkh output
        assert_eq!(estimate_size(&[ScriptType::PubKeyHash], &[25]), 8 + 1 + 148 + 1 + 34);
        assert_eq!(estimate_size(&[], &[]), 10);
    }

    #[test]
    fn test_output_size_large_script() {
        assert_eq!(output_size(300), 8 + 3 + 300);
    }
}
