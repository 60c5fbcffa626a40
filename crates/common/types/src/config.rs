use serde::{Deserialize, Serialize};

use crate::attestation_history::{HISTORY_RECORD_SIZE, LATEST_EPOCH_WRITTEN_SIZE};
use crate::primitives::Epoch;

/// Weak subjectivity period of mainnet, in epochs.
pub const DEFAULT_WEAK_SUBJECTIVITY_PERIOD: u64 = 54_000;

/// Reserved epoch larger than any real epoch.
pub const FAR_FUTURE_EPOCH: Epoch = u64::MAX;

/// Largest period whose full history buffer is addressable on this platform.
pub const MAX_WEAK_SUBJECTIVITY_PERIOD: u64 = max_weak_subjectivity_period();

const fn max_weak_subjectivity_period() -> u64 {
    let slots = (usize::MAX - LATEST_EPOCH_WRITTEN_SIZE) / HISTORY_RECORD_SIZE;
    if slots as u128 > u64::MAX as u128 {
        u64::MAX
    } else {
        slots as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("weak subjectivity period must be greater than zero")]
    ZeroWeakSubjectivityPeriod,
    #[error("weak subjectivity period {0} exceeds the maximum {max}", max = MAX_WEAK_SUBJECTIVITY_PERIOD)]
    WeakSubjectivityPeriodTooLarge(u64),
}

/// Chain constants the slashing protection history depends on.
///
/// Passed explicitly to every component that encodes or stores attestation
/// history, so tests can run with small periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawProtectionConfig")]
pub struct ProtectionConfig {
    #[serde(rename = "WEAK_SUBJECTIVITY_PERIOD")]
    weak_subjectivity_period: u64,
    #[serde(rename = "FAR_FUTURE_EPOCH")]
    far_future_epoch: Epoch,
}

impl ProtectionConfig {
    pub fn new(weak_subjectivity_period: u64, far_future_epoch: Epoch) -> Result<Self, ConfigError> {
        if weak_subjectivity_period == 0 {
            return Err(ConfigError::ZeroWeakSubjectivityPeriod);
        }
        if weak_subjectivity_period > MAX_WEAK_SUBJECTIVITY_PERIOD {
            return Err(ConfigError::WeakSubjectivityPeriodTooLarge(
                weak_subjectivity_period,
            ));
        }
        Ok(Self {
            weak_subjectivity_period,
            far_future_epoch,
        })
    }

    /// Same config with a different weak subjectivity period.
    pub fn with_weak_subjectivity_period(self, period: u64) -> Result<Self, ConfigError> {
        Self::new(period, self.far_future_epoch)
    }

    /// Number of slots in the history ring buffer.
    pub fn weak_subjectivity_period(&self) -> u64 {
        self.weak_subjectivity_period
    }

    pub fn far_future_epoch(&self) -> Epoch {
        self.far_future_epoch
    }

    /// Ring buffer slot holding the given target epoch.
    pub fn slot_index(&self, target_epoch: Epoch) -> u64 {
        target_epoch % self.weak_subjectivity_period
    }
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            weak_subjectivity_period: DEFAULT_WEAK_SUBJECTIVITY_PERIOD,
            far_future_epoch: FAR_FUTURE_EPOCH,
        }
    }
}

#[derive(Deserialize)]
struct RawProtectionConfig {
    #[serde(rename = "WEAK_SUBJECTIVITY_PERIOD", default = "default_period")]
    weak_subjectivity_period: u64,
    #[serde(rename = "FAR_FUTURE_EPOCH", default = "default_far_future_epoch")]
    far_future_epoch: Epoch,
}

fn default_period() -> u64 {
    DEFAULT_WEAK_SUBJECTIVITY_PERIOD
}

fn default_far_future_epoch() -> Epoch {
    FAR_FUTURE_EPOCH
}

impl TryFrom<RawProtectionConfig> for ProtectionConfig {
    type Error = ConfigError;

    fn try_from(raw: RawProtectionConfig) -> Result<Self, Self::Error> {
        Self::new(raw.weak_subjectivity_period, raw.far_future_epoch)
    }
}
