use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::api::{self, StorageBackend, StorageReadView, Table};
use crate::metrics;
use crate::types::LegacyAttestationHistory;

use lambdashield_types::{
    ShortPubkey,
    attestation_history::{EncodedHistory, SizeError},
    config::ProtectionConfig,
    primitives::{Decode, Encode, PUBKEY_LENGTH, ValidatorPubkeyBytes},
};
use tracing::debug;

/// Key inside [`Table::LegacyAttestationHistory`] marking the migration as done.
pub const MIGRATION_COMPLETED_KEY: &[u8] = b"attestations-exported";
/// Value stored under [`MIGRATION_COMPLETED_KEY`].
const MIGRATION_COMPLETED_VALUE: &[u8] = &[1];

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(#[from] api::Error),
    #[error("corrupted attestation history for {pubkey}: {source}")]
    Size {
        pubkey: String,
        #[source]
        source: SizeError,
    },
    #[error("invalid legacy attestation history for {pubkey}: {reason}")]
    LegacyDecode { pubkey: String, reason: String },
    #[error("invalid public key length {0}, expected {expected}", expected = PUBKEY_LENGTH)]
    InvalidKeyLength(usize),
}

fn size_error(pubkey: &ValidatorPubkeyBytes, source: SizeError) -> StoreError {
    StoreError::Size {
        pubkey: hex::encode(pubkey),
        source,
    }
}

fn pubkey_from_bytes(bytes: &[u8]) -> Result<ValidatorPubkeyBytes, StoreError> {
    bytes
        .try_into()
        .map_err(|_| StoreError::InvalidKeyLength(bytes.len()))
}

/// Slashing protection history of every validator key, backed by a
/// pluggable storage backend.
///
/// Each batch operation runs inside a single read view or write batch, so a
/// batch is observed and applied all at once. Histories handed out are owned
/// copies: mutating them has no effect until written back.
#[derive(Clone)]
pub struct SlashingProtectionStore {
    backend: Arc<dyn StorageBackend>,
    config: ProtectionConfig,
}

impl SlashingProtectionStore {
    pub fn new(backend: Arc<dyn StorageBackend>, config: ProtectionConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &ProtectionConfig {
        &self.config
    }

    // ============ Attestation History ============

    /// Returns the attestation history of each requested key.
    ///
    /// Keys without history get a fresh `EncodedHistory::new_for_target(0)`,
    /// which is the normal case for newly imported validators.
    pub fn read_many<'a>(
        &self,
        public_keys: impl IntoIterator<Item = &'a ValidatorPubkeyBytes>,
    ) -> Result<HashMap<ValidatorPubkeyBytes, EncodedHistory>, StoreError> {
        let mut public_keys = public_keys.into_iter().peekable();
        if public_keys.peek().is_none() {
            return Ok(HashMap::new());
        }

        let view = self.backend.begin_read()?;
        let mut histories = HashMap::new();
        for pubkey in public_keys {
            let history = self.read_with(view.as_ref(), pubkey)?;
            histories.insert(*pubkey, history);
        }
        drop(view);

        metrics::inc_histories_read(histories.len());
        Ok(histories)
    }

    /// Returns the attestation history of a single key.
    pub fn read_one(&self, pubkey: &ValidatorPubkeyBytes) -> Result<EncodedHistory, StoreError> {
        let view = self.backend.begin_read()?;
        let history = self.read_with(view.as_ref(), pubkey)?;
        metrics::inc_histories_read(1);
        Ok(history)
    }

    fn read_with(
        &self,
        view: &dyn StorageReadView,
        pubkey: &ValidatorPubkeyBytes,
    ) -> Result<EncodedHistory, StoreError> {
        match view.get(Table::AttestationHistory, pubkey)? {
            Some(bytes) if !bytes.is_empty() => EncodedHistory::from_bytes(bytes, self.config)
                .map_err(|err| size_error(pubkey, err)),
            _ => {
                debug!(pubkey = %ShortPubkey(pubkey), "No attestation history, starting empty");
                Ok(EncodedHistory::new_for_target(0, self.config))
            }
        }
    }

    /// Saves the attestation histories of several keys at once.
    ///
    /// Either every history is written or none is.
    pub fn write_many(
        &self,
        histories: &HashMap<ValidatorPubkeyBytes, EncodedHistory>,
    ) -> Result<(), StoreError> {
        if histories.is_empty() {
            return Ok(());
        }

        let mut entries = Vec::with_capacity(histories.len());
        for (pubkey, history) in histories {
            history
                .assert_valid_size()
                .map_err(|err| size_error(pubkey, err))?;
            entries.push((pubkey.to_vec(), history.as_bytes().to_vec()));
        }

        let mut batch = self.backend.begin_write()?;
        batch.put_batch(Table::AttestationHistory, entries)?;
        batch.commit()?;

        metrics::inc_histories_written(histories.len());
        Ok(())
    }

    /// Saves the attestation history of a single key.
    pub fn write_one(
        &self,
        pubkey: &ValidatorPubkeyBytes,
        history: &EncodedHistory,
    ) -> Result<(), StoreError> {
        history
            .assert_valid_size()
            .map_err(|err| size_error(pubkey, err))?;

        let mut batch = self.backend.begin_write()?;
        batch.put_batch(
            Table::AttestationHistory,
            vec![(pubkey.to_vec(), history.as_bytes().to_vec())],
        )?;
        batch.commit()?;

        metrics::inc_histories_written(1);
        Ok(())
    }

    /// Removes the attestation history of the given keys.
    pub fn delete_many<'a>(
        &self,
        public_keys: impl IntoIterator<Item = &'a ValidatorPubkeyBytes>,
    ) -> Result<(), StoreError> {
        let keys: Vec<Vec<u8>> = public_keys.into_iter().map(|k| k.to_vec()).collect();
        if keys.is_empty() {
            return Ok(());
        }

        let mut batch = self.backend.begin_write()?;
        batch.delete_batch(Table::AttestationHistory, keys)?;
        batch.commit()?;
        Ok(())
    }

    /// Keys with a stored attestation history.
    pub fn public_keys(&self) -> Result<BTreeSet<ValidatorPubkeyBytes>, StoreError> {
        let view = self.backend.begin_read()?;
        let keys = view
            .prefix_iterator(Table::AttestationHistory, &[])?
            .map(|res| pubkey_from_bytes(&res?.0))
            .collect::<Result<_, _>>()?;
        Ok(keys)
    }

    // ============ Legacy Attestation History ============

    /// Distinct keys present in the legacy table, without the migration marker.
    pub fn legacy_public_keys(&self) -> Result<BTreeSet<ValidatorPubkeyBytes>, StoreError> {
        let view = self.backend.begin_read()?;
        let mut keys = BTreeSet::new();
        for entry in view.prefix_iterator(Table::LegacyAttestationHistory, &[])? {
            let (key, _) = entry?;
            if &*key == MIGRATION_COMPLETED_KEY {
                continue;
            }
            keys.insert(pubkey_from_bytes(&key)?);
        }
        Ok(keys)
    }

    /// Loads legacy histories for the given keys from a single read view.
    ///
    /// A key without a legacy entry gets an empty history.
    pub fn legacy_histories<'a>(
        &self,
        public_keys: impl IntoIterator<Item = &'a ValidatorPubkeyBytes>,
    ) -> Result<Vec<(ValidatorPubkeyBytes, LegacyAttestationHistory)>, StoreError> {
        let view = self.backend.begin_read()?;
        let histories = public_keys
            .into_iter()
            .map(|pubkey| {
                let history = match view.get(Table::LegacyAttestationHistory, pubkey)? {
                    Some(bytes) => LegacyAttestationHistory::from_ssz_bytes(&bytes).map_err(
                        |err| StoreError::LegacyDecode {
                            pubkey: hex::encode(pubkey),
                            reason: format!("{err:?}"),
                        },
                    )?,
                    None => LegacyAttestationHistory::default(),
                };
                Ok((*pubkey, history))
            })
            .collect::<Result<_, StoreError>>()?;
        Ok(histories)
    }

    pub fn legacy_history(
        &self,
        pubkey: &ValidatorPubkeyBytes,
    ) -> Result<LegacyAttestationHistory, StoreError> {
        let mut histories = self.legacy_histories([pubkey])?;
        Ok(histories
            .pop()
            .map(|(_, history)| history)
            .unwrap_or_default())
    }

    /// Stores a history in the legacy format.
    ///
    /// Used to import data written by older versions.
    pub fn save_legacy_history(
        &self,
        pubkey: &ValidatorPubkeyBytes,
        history: &LegacyAttestationHistory,
    ) -> Result<(), StoreError> {
        let mut batch = self.backend.begin_write()?;
        batch.put_batch(
            Table::LegacyAttestationHistory,
            vec![(pubkey.to_vec(), history.as_ssz_bytes())],
        )?;
        batch.commit()?;
        Ok(())
    }

    /// Whether the legacy table holds any entry, the marker included.
    pub fn has_legacy_entries(&self) -> Result<bool, StoreError> {
        let view = self.backend.begin_read()?;
        let first = view
            .prefix_iterator(Table::LegacyAttestationHistory, &[])?
            .next()
            .transpose()?;
        Ok(first.is_some())
    }

    pub fn is_migration_completed(&self) -> Result<bool, StoreError> {
        let view = self.backend.begin_read()?;
        let marker = view.get(Table::LegacyAttestationHistory, MIGRATION_COMPLETED_KEY)?;
        Ok(marker.is_some())
    }

    pub fn mark_migration_completed(&self) -> Result<(), StoreError> {
        let mut batch = self.backend.begin_write()?;
        batch.put_batch(
            Table::LegacyAttestationHistory,
            vec![(
                MIGRATION_COMPLETED_KEY.to_vec(),
                MIGRATION_COMPLETED_VALUE.to_vec(),
            )],
        )?;
        batch.commit()?;
        Ok(())
    }
}
