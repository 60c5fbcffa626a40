//! Fixed-layout attestation history used for slashing protection.
//!
//! The history of a single validator is packed into one byte buffer:
//!
//! ```text
//! latest_epoch_written (8 bytes LE) || slot_0 || slot_1 || ... || slot_{P-1}
//! ```
//!
//! Each slot is a [`HistoryRecord`] (8 bytes LE source epoch followed by the
//! 32 bytes signing root). The slot for a target epoch is `target % P`, where
//! `P` is the weak subjectivity period, so the buffer is a ring: targets `P`
//! epochs apart share a slot and the newer write replaces the older one.

use tracing::error;

use crate::{
    config::ProtectionConfig,
    primitives::{Epoch, H256},
};

/// Size of the `latest_epoch_written` header.
pub const LATEST_EPOCH_WRITTEN_SIZE: usize = 8;
/// Size of the source epoch inside a record.
pub const SOURCE_EPOCH_SIZE: usize = 8;
/// Size of the signing root inside a record.
pub const SIGNING_ROOT_SIZE: usize = 32;
/// Size of one encoded [`HistoryRecord`].
pub const HISTORY_RECORD_SIZE: usize = SOURCE_EPOCH_SIZE + SIGNING_ROOT_SIZE;
/// Smallest valid encoded history: the header and no slots.
pub const MIN_ENCODED_SIZE: usize = LATEST_EPOCH_WRITTEN_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SizeError {
    #[error("encoded history size {len} is smaller than the minimal size {min}")]
    TooShort { len: usize, min: usize },
    #[error("encoded history size {len} is not the header plus a multiple of the record size {record_size}")]
    Misaligned { len: usize, record_size: usize },
}

/// Data needed to tell whether an attestation for some target epoch is
/// slashable or a repeat of one already signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryRecord {
    pub source_epoch: Epoch,
    pub signing_root: H256,
}

impl HistoryRecord {
    pub fn new(source_epoch: Epoch, signing_root: H256) -> Self {
        Self {
            source_epoch,
            signing_root,
        }
    }

    /// Record marking a slot with no signed attestation.
    pub fn empty(config: &ProtectionConfig) -> Self {
        Self {
            source_epoch: config.far_future_epoch(),
            signing_root: H256::zero(),
        }
    }

    /// Only the source epoch decides emptiness; the signing root is ignored.
    pub fn is_empty(&self, config: &ProtectionConfig) -> bool {
        self.source_epoch == config.far_future_epoch()
    }

    pub fn encode(&self) -> [u8; HISTORY_RECORD_SIZE] {
        let mut bytes = [0u8; HISTORY_RECORD_SIZE];
        bytes[..SOURCE_EPOCH_SIZE].copy_from_slice(&self.source_epoch.to_le_bytes());
        bytes[SOURCE_EPOCH_SIZE..].copy_from_slice(self.signing_root.as_bytes());
        bytes
    }

    pub fn decode(bytes: &[u8; HISTORY_RECORD_SIZE]) -> Self {
        let mut source_epoch = [0u8; SOURCE_EPOCH_SIZE];
        source_epoch.copy_from_slice(&bytes[..SOURCE_EPOCH_SIZE]);
        Self {
            source_epoch: u64::from_le_bytes(source_epoch),
            signing_root: H256::from_slice(&bytes[SOURCE_EPOCH_SIZE..]),
        }
    }
}

/// Attestation history of one validator, encoded as a ring buffer of
/// [`HistoryRecord`]s indexed by target epoch.
///
/// Every accessor checks the buffer size first, so a truncated or otherwise
/// malformed buffer is reported as a [`SizeError`] instead of being read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedHistory {
    bytes: Vec<u8>,
    config: ProtectionConfig,
}

impl EncodedHistory {
    /// Creates a history covering slots `0..=target_epoch % P`, all empty.
    ///
    /// The `latest_epoch_written` header is zeroed and carries no meaning
    /// until set.
    pub fn new_for_target(target_epoch: Epoch, config: ProtectionConfig) -> Self {
        let relative_target = config.slot_index(target_epoch);
        let size = LATEST_EPOCH_WRITTEN_SIZE + (relative_target as usize + 1) * HISTORY_RECORD_SIZE;
        let mut history = Self {
            bytes: vec![0; size],
            config,
        };
        let empty = HistoryRecord::empty(&config);
        for slot in 0..=relative_target {
            // The buffer was sized above, so this only fails on a logic error.
            // A failure leaves the slot zeroed and cannot touch stored data.
            if let Err(err) = history.set_target_data(slot, &empty) {
                error!(%err, %slot, "Failed to set empty target data");
            }
        }
        history
    }

    /// Wraps bytes read from storage, rejecting buffers of invalid size.
    pub fn from_bytes(bytes: Vec<u8>, config: ProtectionConfig) -> Result<Self, SizeError> {
        let history = Self { bytes, config };
        history.assert_valid_size()?;
        Ok(history)
    }

    pub fn assert_valid_size(&self) -> Result<(), SizeError> {
        let len = self.bytes.len();
        if len < MIN_ENCODED_SIZE {
            return Err(SizeError::TooShort {
                len,
                min: MIN_ENCODED_SIZE,
            });
        }
        if (len - MIN_ENCODED_SIZE) % HISTORY_RECORD_SIZE != 0 {
            return Err(SizeError::Misaligned {
                len,
                record_size: HISTORY_RECORD_SIZE,
            });
        }
        Ok(())
    }

    pub fn get_latest_epoch_written(&self) -> Result<Epoch, SizeError> {
        self.assert_valid_size()?;
        let header = self
            .bytes
            .first_chunk::<LATEST_EPOCH_WRITTEN_SIZE>()
            .ok_or(SizeError::TooShort {
                len: self.bytes.len(),
                min: MIN_ENCODED_SIZE,
            })?;
        Ok(u64::from_le_bytes(*header))
    }

    pub fn set_latest_epoch_written(&mut self, epoch: Epoch) -> Result<&mut Self, SizeError> {
        self.assert_valid_size()?;
        self.bytes[..LATEST_EPOCH_WRITTEN_SIZE].copy_from_slice(&epoch.to_le_bytes());
        Ok(self)
    }

    /// Returns the record stored for `target_epoch`'s slot.
    ///
    /// `Ok(None)` means the buffer hasn't grown to that slot yet, which is
    /// different from a malformed buffer.
    pub fn get_target_data(&self, target_epoch: Epoch) -> Result<Option<HistoryRecord>, SizeError> {
        self.assert_valid_size()?;
        let cursor = self.cursor(target_epoch);
        let record = self
            .bytes
            .get(cursor..)
            .and_then(|rest| rest.first_chunk::<HISTORY_RECORD_SIZE>())
            .map(HistoryRecord::decode);
        Ok(record)
    }

    /// Writes the record into `target_epoch`'s slot, zero-extending the
    /// buffer up to that slot if needed. The buffer never shrinks.
    pub fn set_target_data(
        &mut self,
        target_epoch: Epoch,
        record: &HistoryRecord,
    ) -> Result<&mut Self, SizeError> {
        self.assert_valid_size()?;
        let cursor = self.cursor(target_epoch);
        let end = cursor + HISTORY_RECORD_SIZE;
        if self.bytes.len() < end {
            self.bytes.resize(end, 0);
        }
        self.bytes[cursor..end].copy_from_slice(&record.encode());
        Ok(self)
    }

    /// Number of slots the buffer currently holds.
    pub fn slot_count(&self) -> usize {
        self.bytes.len().saturating_sub(MIN_ENCODED_SIZE) / HISTORY_RECORD_SIZE
    }

    pub fn config(&self) -> &ProtectionConfig {
        &self.config
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    fn cursor(&self, target_epoch: Epoch) -> usize {
        LATEST_EPOCH_WRITTEN_SIZE + self.config.slot_index(target_epoch) as usize * HISTORY_RECORD_SIZE
    }
}
