use std::collections::BTreeMap;

use lambdashield_types::primitives::Epoch;
use ssz_derive::{Decode, Encode};

/// One signed attestation in the legacy format: the target epoch and the
/// source epoch it was voted from. The signing root was never recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct LegacyTargetSource {
    pub target_epoch: Epoch,
    pub source_epoch: Epoch,
}

/// Attestation history as stored before the ring-buffer format.
///
/// Variable size: one entry per signed target epoch, without bound.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct LegacyAttestationHistory {
    pub latest_epoch_written: Epoch,
    pub target_to_source: Vec<LegacyTargetSource>,
}

impl LegacyAttestationHistory {
    pub fn new(
        latest_epoch_written: Epoch,
        target_to_source: impl IntoIterator<Item = (Epoch, Epoch)>,
    ) -> Self {
        Self {
            latest_epoch_written,
            target_to_source: target_to_source
                .into_iter()
                .map(|(target_epoch, source_epoch)| LegacyTargetSource {
                    target_epoch,
                    source_epoch,
                })
                .collect(),
        }
    }

    /// Target to source mapping, ordered by target epoch.
    ///
    /// When a target appears more than once the last entry wins.
    pub fn target_to_source_map(&self) -> BTreeMap<Epoch, Epoch> {
        self.target_to_source
            .iter()
            .map(|entry| (entry.target_epoch, entry.source_epoch))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssz::{Decode, Encode};

    #[test]
    fn ssz_roundtrip() {
        let history = LegacyAttestationHistory::new(3, [(1, 10), (3, 12)]);
        let bytes = history.as_ssz_bytes();
        let decoded = LegacyAttestationHistory::from_ssz_bytes(&bytes).unwrap();
        assert_eq!(decoded, history);
    }

    #[test]
    fn duplicate_targets_keep_last_entry() {
        let history = LegacyAttestationHistory::new(5, [(5, 1), (2, 0), (5, 4)]);
        let map = history.target_to_source_map();
        assert_eq!(map.into_iter().collect::<Vec<_>>(), vec![(2, 0), (5, 4)]);
    }

    #[test]
    fn truncated_bytes_fail_to_decode() {
        let bytes = LegacyAttestationHistory::new(3, [(1, 10)]).as_ssz_bytes();
        assert!(LegacyAttestationHistory::from_ssz_bytes(&bytes[..bytes.len() - 1]).is_err());
    }
}
