//! Engine configuration
//!
//! All tunables of the funding engine in one serde-friendly struct. Every
//! field has a default, so a partial JSON document is a valid configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::drafts::change::{DEFAULT_CHANGE_DESTINATIONS, DEFAULT_CHANGE_MINIMUM_SATOSHIS};
use crate::errors::{WalletError, WalletResult};
use crate::fees::{FeeUnit, DUST_LIMIT};

/// Configuration for the funding engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fee rate used when a draft does not name one
    pub fee_unit: FeeUnit,
    /// Outputs at or below this value are rejected
    pub dust_limit: u64,
    pub change_destinations: usize,
    pub change_minimum_satoshis: u64,
    /// Passes of the change fee re-estimation
    pub change_passes: usize,
    /// Draft lifetime when the request does not set `expires_in`
    #[serde(with = "duration_ms")]
    pub draft_expiry: Duration,
    /// Lease of the per-owner reservation lock
    #[serde(with = "duration_ms")]
    pub lock_ttl: Duration,
    /// How long to wait for a busy reservation lock
    #[serde(with = "duration_ms")]
    pub lock_wait: Duration,
    /// Period of the stale draft cleanup task
    #[serde(with = "duration_ms")]
    pub cleanup_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fee_unit: FeeUnit::default(),
            dust_limit: DUST_LIMIT,
            change_destinations: DEFAULT_CHANGE_DESTINATIONS,
            change_minimum_satoshis: DEFAULT_CHANGE_MINIMUM_SATOSHIS,
            change_passes: 2,
            draft_expiry: Duration::from_secs(20),
            lock_ttl: Duration::from_secs(20),
            lock_wait: Duration::from_secs(10),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> WalletResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> WalletResult<()> {
        self.fee_unit.validate()?;
        if self.change_passes == 0 {
            return Err(WalletError::InvalidConfiguration(
                "change_passes must be at least 1".to_string(),
            ));
        }
        if self.lock_ttl.is_zero() {
            return Err(WalletError::InvalidConfiguration(
                "lock_ttl must be non-zero".to_string(),
            ));
        }
        if self.cleanup_interval.is_zero() {
            return Err(WalletError::InvalidConfiguration(
                "cleanup_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_fee_unit(mut self, fee_unit: FeeUnit) -> Self {
        self.fee_unit = fee_unit;
        self
    }

    pub fn with_change_minimum_satoshis(mut self, minimum: u64) -> Self {
        self.change_minimum_satoshis = minimum;
        self
    }

    pub fn with_change_passes(mut self, passes: usize) -> Self {
        self.change_passes = passes;
        self
    }

    pub fn with_draft_expiry(mut self, expiry: Duration) -> Self {
        self.draft_expiry = expiry;
        self
    }

    /// Set the reservation lock lease and wait
    pub fn with_lock_timing(mut self, ttl: Duration, wait: Duration) -> Self {
        self.lock_ttl = ttl;
        self.lock_wait = wait;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
