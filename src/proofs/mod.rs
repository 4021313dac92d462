//! Merkle path compaction and merging
//!
//! Both are pure functions over proof material and can be called
//! concurrently without coordination.

pub mod compactor;
pub mod merger;

pub use compactor::{compact_by_height, compact_path, proof_to_bump};
pub use merger::{calculate_merged_bump, group_by_height, merge_bumps};
