//! Raw transaction parsing and serialization
//!
//! Transactions are kept byte-exact: parsing records the consumed bytes so
//! the txid of a parsed transaction always matches the bytes it came from.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read};

use crate::data_structures::types::{Hash256, UtxoPointer};
use crate::errors::WalletResult;
use crate::utils::{read_varint, write_varint};

/// Sequence number used for unsigned draft inputs
pub const DEFAULT_SEQUENCE: u32 = 0xffff_ffff;

/// Transaction input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Source txid, internal byte order
    pub prev_txid: Hash256,
    pub vout: u32,
    pub unlocking_script: Vec<u8>,
    pub sequence: u32,
}

impl TxInput {
    /// Input spending `pointer` with an empty unlocking script
    pub fn unsigned(pointer: &UtxoPointer) -> WalletResult<Self> {
        Ok(Self {
            prev_txid: Hash256::from_hex(&pointer.transaction_id)?,
            vout: pointer.output_index,
            unlocking_script: Vec::new(),
            sequence: DEFAULT_SEQUENCE,
        })
    }

    pub fn outpoint(&self) -> UtxoPointer {
        UtxoPointer::new(self.prev_txid.to_hex(), self.vout)
    }
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub satoshis: u64,
    pub locking_script: Vec<u8>,
}

/// A wire-format transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u32,
}

impl Default for Transaction {
    fn default() -> Self {
        Self {
            version: 1,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
        }
    }
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one transaction from the reader, leaving it positioned after the last byte
    pub fn read_from<R: Read>(reader: &mut R) -> WalletResult<Self> {
        let version = reader.read_u32::<LittleEndian>()?;

        let input_count = read_varint(reader)?;
        let mut inputs = Vec::with_capacity(input_count.min(1024) as usize);
        for _ in 0..input_count {
            let mut prev_txid = [0u8; 32];
            reader.read_exact(&mut prev_txid)?;
            let vout = reader.read_u32::<LittleEndian>()?;
            let unlocking_script = read_script(reader)?;
            let sequence = reader.read_u32::<LittleEndian>()?;
            inputs.push(TxInput {
                prev_txid: Hash256::new(prev_txid),
                vout,
                unlocking_script,
                sequence,
            });
        }

        let output_count = read_varint(reader)?;
        let mut outputs = Vec::with_capacity(output_count.min(1024) as usize);
        for _ in 0..output_count {
            let satoshis = reader.read_u64::<LittleEndian>()?;
            let locking_script = read_script(reader)?;
            outputs.push(TxOutput {
                satoshis,
                locking_script,
            });
        }

        let lock_time = reader.read_u32::<LittleEndian>()?;
        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    pub fn from_bytes(raw: &[u8]) -> WalletResult<Self> {
        let mut cursor = Cursor::new(raw);
        Self::read_from(&mut cursor)
    }

    pub fn from_hex(raw_hex: &str) -> WalletResult<Self> {
        Self::from_bytes(&hex::decode(raw_hex)?)
    }

    pub fn write_to(&self, buf: &mut Vec<u8>) -> WalletResult<()> {
        buf.write_u32::<LittleEndian>(self.version)?;
        write_varint(buf, self.inputs.len() as u64)?;
        for input in &self.inputs {
            buf.extend_from_slice(input.prev_txid.as_bytes());
            buf.write_u32::<LittleEndian>(input.vout)?;
            write_varint(buf, input.unlocking_script.len() as u64)?;
            buf.extend_from_slice(&input.unlocking_script);
            buf.write_u32::<LittleEndian>(input.sequence)?;
        }
        write_varint(buf, self.outputs.len() as u64)?;
        for output in &self.outputs {
            buf.write_u64::<LittleEndian>(output.satoshis)?;
            write_varint(buf, output.locking_script.len() as u64)?;
            buf.extend_from_slice(&output.locking_script);
        }
        buf.write_u32::<LittleEndian>(self.lock_time)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> WalletResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    pub fn to_hex(&self) -> WalletResult<String> {
        Ok(hex::encode(self.to_bytes()?))
    }

    /// Transaction id
    pub fn txid(&self) -> WalletResult<Hash256> {
        Ok(Hash256::hash(&self.to_bytes()?))
    }

    pub fn total_output_satoshis(&self) -> u64 {
        self.outputs.iter().map(|o| o.satoshis).sum()
    }
}

fn read_script<R: Read>(reader: &mut R) -> WalletResult<Vec<u8>> {
    let len = read_varint(reader)?;
    let mut script = Vec::new();
    let read = reader.take(len).read_to_end(&mut script)?;
    if (read as u64) < len {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("script of {len} bytes truncated at {read}"),
        )
        .into());
    }
    Ok(script)
}
