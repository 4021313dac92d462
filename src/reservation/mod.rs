//! UTXO reservation
//!
//! A UTXO is reserved by at most one draft at a time. All writes for one
//! owner happen under that owner's reservation lock, so concurrent drafts
//! always receive disjoint UTXO sets.

pub mod engine;
pub mod guard;

pub use engine::{Reservation, ReservationEngine, ReservationRequest};
pub use guard::ReservationGuard;
