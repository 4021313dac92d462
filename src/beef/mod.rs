//! BEEF bundles: a transaction with the ancestry and merkle paths needed to
//! verify it without a full node

pub mod encoder;
pub mod format;

pub use encoder::{encode, encode_hex};
pub use format::{Beef, BeefTx, BEEF_V1};
