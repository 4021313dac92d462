//! Change planning and splitting
//!
//! Everything here is pure arithmetic over satoshi amounts and the size
//! model in [`crate::fees`]; the builder feeds it and applies the result.

use rand::Rng;

use crate::data_structures::draft_transaction::ChangeStrategy;
use crate::errors::{WalletError, WalletResult};
use crate::fees::{FeeUnit, CHANGE_OUTPUT_SIZE};

/// Default number of change destinations
pub const DEFAULT_CHANGE_DESTINATIONS: usize = 1;
/// Default minimum value of one change output
pub const DEFAULT_CHANGE_MINIMUM_SATOSHIS: u64 = 1250;

/// Outcome of change planning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangePlan {
    /// Number of change outputs to create; zero when change was absorbed
    pub destinations: usize,
    pub change_satoshis: u64,
    pub fee: u64,
}

/// Parameters of change planning
#[derive(Debug, Clone, Copy)]
pub struct ChangeRequest {
    /// Inputs minus requested outputs
    pub available: u64,
    /// Estimated size without change outputs
    pub base_size: u64,
    pub fee_unit: FeeUnit,
    /// Requested destination count; zero means default
    pub destinations: usize,
    /// Requested minimum per output; zero means default
    pub minimum_satoshis: u64,
    /// Maximum re-estimation passes
    pub max_passes: usize,
}

/// Work out how many change outputs to add and what they carry.
///
/// The fee is re-estimated with `N * 35` extra bytes. When the per-output
/// share drops below the minimum, N collapses to one and the estimate runs
/// again. If the added fee would consume all change, no change output is
/// created and the fee absorbs the remainder.
pub fn plan_change(request: &ChangeRequest) -> WalletResult<ChangePlan> {
    let base_fee = request.fee_unit.fee_for_size(request.base_size);
    if request.available < base_fee {
        return Err(WalletError::InsufficientFunds(format!(
            "{} available after outputs, fee is {base_fee}",
            request.available
        )));
    }
    let absorbed = ChangePlan {
        destinations: 0,
        change_satoshis: 0,
        fee: request.available,
    };
    if request.available == base_fee {
        return Ok(absorbed);
    }

    let minimum = if request.minimum_satoshis == 0 {
        DEFAULT_CHANGE_MINIMUM_SATOSHIS
    } else {
        request.minimum_satoshis
    };
    let mut count = request.destinations.max(DEFAULT_CHANGE_DESTINATIONS);
    let mut change = request.available - base_fee;

    for pass in 0..request.max_passes.max(1) {
        if count > 1 && change / (count as u64) < minimum {
            count = 1;
        }
        let fee = request
            .fee_unit
            .fee_for_size(request.base_size + count as u64 * CHANGE_OUTPUT_SIZE);
        if fee >= request.available {
            tracing::debug!(fee, available = request.available, "change absorbed into fee");
            return Ok(absorbed);
        }
        change = request.available - fee;
        let settled = count == 1 || change / (count as u64) >= minimum;
        if settled || pass + 1 == request.max_passes.max(1) {
            return Ok(ChangePlan {
                destinations: count,
                change_satoshis: change,
                fee,
            });
        }
    }
    Ok(absorbed)
}

/// Even split with the remainder going to the first share
pub fn split_remainder_first(total: u64, count: usize) -> Vec<u64> {
    if count == 0 {
        return Vec::new();
    }
    let per = total / count as u64;
    let mut shares = vec![per; count];
    shares[0] += total - per * count as u64;
    shares
}

/// Even split with the remainder going to the last share
pub fn split_default(total: u64, count: usize) -> Vec<u64> {
    let mut shares = split_remainder_first(total, count);
    shares.reverse();
    shares
}

/// Each share but the last is U[0.75, 1.25] of the even share; the last takes the rest.
///
/// Every share is at least one satoshi when `total >= count`.
pub fn split_random<R: Rng + ?Sized>(total: u64, count: usize, rng: &mut R) -> Vec<u64> {
    if count == 0 {
        return Vec::new();
    }
    let even = total as f64 / count as f64;
    let mut remaining = total;
    let mut shares = Vec::with_capacity(count);
    for i in 1..count {
        let weight: f64 = rng.gen_range(0.75..=1.25);
        // Leave one satoshi for each share still to come
        let ceiling = remaining.saturating_sub((count - i) as u64);
        let share = ((even * weight) as u64).max(1).min(ceiling);
        remaining -= share;
        shares.push(share);
    }
    shares.push(remaining);
    shares
}

/// Split `total` over `count` destinations with `strategy`
pub fn split_change<R: Rng + ?Sized>(
    strategy: ChangeStrategy,
    total: u64,
    count: usize,
    rng: &mut R,
) -> WalletResult<Vec<u64>> {
    // No zero-value change outputs
    let count = count.min(total.max(1) as usize);
    match strategy {
        ChangeStrategy::Default => Ok(split_default(total, count)),
        ChangeStrategy::Random => Ok(split_random(total, count, rng)),
        ChangeStrategy::Nominations => Err(WalletError::NotImplemented(
            "nominations change strategy".to_string(),
        )),
    }
}
