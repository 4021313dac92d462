//! Shared low-level helpers

pub mod hash;
pub mod varint;

pub use hash::*;
pub use varint::*;

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the unix epoch
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Random 32 byte identifier, hex encoded
pub fn random_id() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}
