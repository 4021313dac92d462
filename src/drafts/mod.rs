//! Draft transactions: construction, change and lifecycle

pub mod builder;
pub mod change;
pub mod lifecycle;

pub use builder::DraftBuilder;
pub use change::{
    plan_change, split_change, ChangePlan, ChangeRequest, DEFAULT_CHANGE_DESTINATIONS,
    DEFAULT_CHANGE_MINIMUM_SATOSHIS,
};
pub use lifecycle::{cancel_draft, complete_draft, expire_draft, expire_stale_drafts, unreserve};
