//! One-time conversion of legacy attestation history into [`EncodedHistory`].
//!
//! The migration is guarded by a completion marker stored in the legacy table.
//! Data and marker are written in separate batches: if the process stops in
//! between, the next start converts everything again and, since conversion is
//! deterministic, writes the same bytes.

use std::collections::HashMap;

use lambdashield_types::{
    ShortPubkey,
    attestation_history::{EncodedHistory, HistoryRecord, SizeError},
    config::ProtectionConfig,
    primitives::H256,
};
use tracing::{debug, info};

use crate::{
    metrics,
    store::{SlashingProtectionStore, StoreError},
    types::LegacyAttestationHistory,
};

/// Signing root written for every migrated record.
///
/// The legacy format never stored signing roots, so migrated records carry
/// this non-empty marker (`0x01` followed by zeroes) instead.
pub const MIGRATED_SIGNING_ROOT: H256 = H256(migrated_signing_root_bytes());

const fn migrated_signing_root_bytes() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    bytes[0] = 1;
    bytes
}

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("failed to analyze whether attestations should be migrated: {0}")]
    Analyze(#[source] StoreError),
    #[error("failed to load legacy attestation history: {0}")]
    Load(#[source] StoreError),
    #[error("failed to encode attestation history of {pubkey}: {source}")]
    Encoding {
        pubkey: String,
        #[source]
        source: SizeError,
    },
    #[error("failed to save migrated attestation history: {0}")]
    Save(#[source] StoreError),
    #[error("failed to set migrated attestations flag: {0}")]
    MarkCompleted(#[source] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// No legacy data, or it was already migrated.
    NotRequired,
    /// Legacy histories of `keys` validators were converted.
    Migrated { keys: usize },
}

/// Converts a legacy history into the ring-buffer encoding.
///
/// Targets are applied in ascending order, so when two legacy targets share a
/// slot the higher one is kept.
pub fn convert_legacy_history(
    legacy: &LegacyAttestationHistory,
    config: ProtectionConfig,
) -> Result<EncodedHistory, SizeError> {
    let mut history = EncodedHistory::new_for_target(legacy.latest_epoch_written, config);
    history.set_latest_epoch_written(legacy.latest_epoch_written)?;
    for (target_epoch, source_epoch) in legacy.target_to_source_map() {
        history.set_target_data(
            target_epoch,
            &HistoryRecord::new(source_epoch, MIGRATED_SIGNING_ROOT),
        )?;
    }
    Ok(history)
}

/// Migration of the legacy attestation history table.
///
/// Must run before the store is handed to anything that signs.
pub struct AttestationMigration<'a> {
    store: &'a SlashingProtectionStore,
    state: MigrationState,
}

impl<'a> AttestationMigration<'a> {
    pub fn new(store: &'a SlashingProtectionStore) -> Self {
        Self {
            store,
            state: MigrationState::NotStarted,
        }
    }

    pub fn state(&self) -> MigrationState {
        self.state
    }

    /// True when the legacy table has entries and no completion marker.
    pub fn should_migrate(&self) -> Result<bool, StoreError> {
        if !self.store.has_legacy_entries()? {
            return Ok(false);
        }
        Ok(!self.store.is_migration_completed()?)
    }

    /// Runs the migration if needed.
    ///
    /// Any failure aborts the whole migration. Callers must not go on
    /// signing with a store whose migration failed.
    pub fn run(&mut self) -> Result<MigrationOutcome, MigrationError> {
        if !self.should_migrate().map_err(MigrationError::Analyze)? {
            debug!("Attestation history migration not required");
            self.state = MigrationState::Completed;
            return Ok(MigrationOutcome::NotRequired);
        }

        info!("Starting attestation protection db migration to v2...");
        self.state = MigrationState::InProgress;

        let config = *self.store.config();
        let public_keys = self
            .store
            .legacy_public_keys()
            .map_err(MigrationError::Load)?;
        let legacy_histories = self
            .store
            .legacy_histories(&public_keys)
            .map_err(MigrationError::Load)?;

        let mut histories = HashMap::with_capacity(legacy_histories.len());
        for (pubkey, legacy) in legacy_histories {
            let history = convert_legacy_history(&legacy, config).map_err(|source| {
                MigrationError::Encoding {
                    pubkey: hex::encode(pubkey),
                    source,
                }
            })?;
            debug!(
                pubkey = %ShortPubkey(&pubkey),
                latest_epoch_written = legacy.latest_epoch_written,
                targets = legacy.target_to_source.len(),
                "Converted legacy attestation history"
            );
            histories.insert(pubkey, history);
        }

        self.store
            .write_many(&histories)
            .map_err(MigrationError::Save)?;
        self.store
            .mark_migration_completed()
            .map_err(MigrationError::MarkCompleted)?;

        self.state = MigrationState::Completed;
        metrics::set_migrated_keys(histories.len());
        info!(keys = histories.len(), "Finished attestation protection db migration to v2");

        Ok(MigrationOutcome::Migrated {
            keys: histories.len(),
        })
    }
}

impl SlashingProtectionStore {
    /// Migrates legacy attestation history, if any is left to migrate.
    pub fn migrate_attestation_history(&self) -> Result<MigrationOutcome, MigrationError> {
        AttestationMigration::new(self).run()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::api::{self, StorageBackend, StorageReadView, StorageWriteBatch, Table};
    use crate::backend::InMemoryBackend;
    use lambdashield_types::{config::FAR_FUTURE_EPOCH, primitives::ValidatorPubkeyBytes};

    const PERIOD: u64 = 16;

    fn config() -> ProtectionConfig {
        ProtectionConfig::new(PERIOD, FAR_FUTURE_EPOCH).unwrap()
    }

    fn store() -> SlashingProtectionStore {
        SlashingProtectionStore::new(Arc::new(InMemoryBackend::new()), config())
    }

    fn pubkey(byte: u8) -> ValidatorPubkeyBytes {
        [byte; 48]
    }

    fn migrated(source_epoch: u64) -> Option<HistoryRecord> {
        Some(HistoryRecord::new(source_epoch, MIGRATED_SIGNING_ROOT))
    }

    /// Backend rejecting every write to one table.
    struct TableFailingBackend {
        inner: InMemoryBackend,
        failing_table: Table,
    }

    struct TableFailingBatch {
        inner: Box<dyn StorageWriteBatch>,
        failing_table: Table,
    }

    impl StorageBackend for TableFailingBackend {
        fn begin_read(&self) -> Result<Box<dyn StorageReadView + '_>, api::Error> {
            self.inner.begin_read()
        }

        fn begin_write(&self) -> Result<Box<dyn StorageWriteBatch + 'static>, api::Error> {
            Ok(Box::new(TableFailingBatch {
                inner: self.inner.begin_write()?,
                failing_table: self.failing_table,
            }))
        }
    }

    impl StorageWriteBatch for TableFailingBatch {
        fn put_batch(
            &mut self,
            table: Table,
            batch: Vec<(Vec<u8>, Vec<u8>)>,
        ) -> Result<(), api::Error> {
            if table == self.failing_table {
                return Err("disk full".into());
            }
            self.inner.put_batch(table, batch)
        }

        fn delete_batch(&mut self, table: Table, keys: Vec<Vec<u8>>) -> Result<(), api::Error> {
            self.inner.delete_batch(table, keys)
        }

        fn commit(self: Box<Self>) -> Result<(), api::Error> {
            self.inner.commit()
        }
    }

    /// Healthy store and a store over the same data whose writes to
    /// `failing_table` fail.
    fn failing_store(failing_table: Table) -> (SlashingProtectionStore, SlashingProtectionStore) {
        let inner = InMemoryBackend::new();
        let healthy = SlashingProtectionStore::new(Arc::new(inner.clone()), config());
        let failing = SlashingProtectionStore::new(
            Arc::new(TableFailingBackend {
                inner,
                failing_table,
            }),
            config(),
        );
        (healthy, failing)
    }

    #[test]
    fn migrated_signing_root_is_one_padded() {
        let mut expected = [0u8; 32];
        expected[0] = 1;
        assert_eq!(MIGRATED_SIGNING_ROOT.as_bytes(), &expected);
    }

    #[test]
    fn convert_keeps_sources_and_latest_epoch() {
        let legacy = LegacyAttestationHistory::new(3, [(1, 10), (3, 12)]);
        let history = convert_legacy_history(&legacy, config()).unwrap();

        assert_eq!(history.get_latest_epoch_written().unwrap(), 3);
        assert_eq!(history.get_target_data(1).unwrap(), migrated(10));
        assert_eq!(history.get_target_data(3).unwrap(), migrated(12));
        let untouched = history.get_target_data(2).unwrap().unwrap();
        assert!(untouched.is_empty(&config()));
    }

    #[test]
    fn convert_aliased_targets_keeps_highest() {
        let legacy = LegacyAttestationHistory::new(PERIOD + 2, [(PERIOD + 2, 7), (2, 1)]);
        let history = convert_legacy_history(&legacy, config()).unwrap();
        assert_eq!(history.get_target_data(2).unwrap(), migrated(7));
    }

    #[test]
    fn nothing_to_migrate_on_empty_store() {
        let store = store();
        let mut migration = AttestationMigration::new(&store);
        assert!(!migration.should_migrate().unwrap());
        assert_eq!(migration.run().unwrap(), MigrationOutcome::NotRequired);
        assert_eq!(migration.state(), MigrationState::Completed);
        assert!(!store.is_migration_completed().unwrap());
    }

    #[test]
    fn migrates_every_legacy_key() {
        let store = store();
        store
            .save_legacy_history(&pubkey(1), &LegacyAttestationHistory::new(3, [(1, 10), (3, 12)]))
            .unwrap();
        store
            .save_legacy_history(&pubkey(2), &LegacyAttestationHistory::new(20, [(20, 19)]))
            .unwrap();

        let mut migration = AttestationMigration::new(&store);
        assert_eq!(migration.state(), MigrationState::NotStarted);
        assert!(migration.should_migrate().unwrap());
        assert_eq!(migration.run().unwrap(), MigrationOutcome::Migrated { keys: 2 });
        assert_eq!(migration.state(), MigrationState::Completed);
        assert!(store.is_migration_completed().unwrap());

        let histories = store.read_many(&[pubkey(1), pubkey(2)]).unwrap();
        let first = &histories[&pubkey(1)];
        assert_eq!(first.get_latest_epoch_written().unwrap(), 3);
        assert_eq!(first.get_target_data(1).unwrap(), migrated(10));
        assert_eq!(first.get_target_data(3).unwrap(), migrated(12));

        let second = &histories[&pubkey(2)];
        assert_eq!(second.get_latest_epoch_written().unwrap(), 20);
        assert_eq!(second.get_target_data(20).unwrap(), migrated(19));
        assert_eq!(second.slot_count(), (20 % PERIOD + 1) as usize);
    }

    #[test]
    fn second_run_is_a_noop() {
        let store = store();
        store
            .save_legacy_history(&pubkey(1), &LegacyAttestationHistory::new(3, [(1, 10)]))
            .unwrap();

        store.migrate_attestation_history().unwrap();
        let after_first = store.read_one(&pubkey(1)).unwrap();

        assert_eq!(
            store.migrate_attestation_history().unwrap(),
            MigrationOutcome::NotRequired
        );
        assert_eq!(store.read_one(&pubkey(1)).unwrap(), after_first);
    }

    #[test]
    fn rerun_without_marker_reproduces_same_history() {
        let store = store();
        store
            .save_legacy_history(&pubkey(1), &LegacyAttestationHistory::new(9, [(4, 2), (9, 8)]))
            .unwrap();

        let first = convert_legacy_history(&store.legacy_history(&pubkey(1)).unwrap(), config())
            .unwrap();
        store
            .write_many(&HashMap::from([(pubkey(1), first.clone())]))
            .unwrap();

        // Data written but marker missing, as after a crash between the two batches
        assert!(!store.is_migration_completed().unwrap());
        assert_eq!(
            store.migrate_attestation_history().unwrap(),
            MigrationOutcome::Migrated { keys: 1 }
        );
        assert_eq!(store.read_one(&pubkey(1)).unwrap(), first);
    }

    #[test]
    fn failed_save_leaves_migration_unfinished() {
        let (healthy, failing) = failing_store(Table::AttestationHistory);
        healthy
            .save_legacy_history(&pubkey(1), &LegacyAttestationHistory::new(3, [(1, 10)]))
            .unwrap();
        healthy
            .save_legacy_history(&pubkey(2), &LegacyAttestationHistory::new(5, [(5, 4)]))
            .unwrap();

        let mut migration = AttestationMigration::new(&failing);
        let err = migration.run().unwrap_err();
        assert!(matches!(err, MigrationError::Save(StoreError::Backend(_))));
        assert_eq!(migration.state(), MigrationState::InProgress);
        assert!(!healthy.is_migration_completed().unwrap());
        assert!(healthy.public_keys().unwrap().is_empty());

        assert_eq!(
            healthy.migrate_attestation_history().unwrap(),
            MigrationOutcome::Migrated { keys: 2 }
        );
    }

    #[test]
    fn failed_marker_write_reruns_to_same_history() {
        let (healthy, failing) = failing_store(Table::LegacyAttestationHistory);
        healthy
            .save_legacy_history(&pubkey(1), &LegacyAttestationHistory::new(9, [(4, 2), (9, 8)]))
            .unwrap();

        let mut migration = AttestationMigration::new(&failing);
        let err = migration.run().unwrap_err();
        assert!(matches!(
            err,
            MigrationError::MarkCompleted(StoreError::Backend(_))
        ));
        assert_eq!(migration.state(), MigrationState::InProgress);
        assert!(!healthy.is_migration_completed().unwrap());
        let written = healthy.read_one(&pubkey(1)).unwrap();
        assert_eq!(written.get_target_data(9).unwrap(), migrated(8));

        assert_eq!(
            healthy.migrate_attestation_history().unwrap(),
            MigrationOutcome::Migrated { keys: 1 }
        );
        assert!(healthy.is_migration_completed().unwrap());
        assert_eq!(healthy.read_one(&pubkey(1)).unwrap(), written);
    }

    #[test]
    fn undecodable_legacy_history_aborts_migration() {
        let backend = Arc::new(InMemoryBackend::new());
        let broken = SlashingProtectionStore::new(backend.clone(), config());
        broken
            .save_legacy_history(&pubkey(2), &LegacyAttestationHistory::new(3, [(1, 10)]))
            .unwrap();

        let mut batch = backend.begin_write().unwrap();
        batch
            .put_batch(
                Table::LegacyAttestationHistory,
                vec![(pubkey(1).to_vec(), vec![0xff; 3])],
            )
            .unwrap();
        batch.commit().unwrap();

        let mut migration = AttestationMigration::new(&broken);
        let err = migration.run().unwrap_err();
        assert!(matches!(err, MigrationError::Load(StoreError::LegacyDecode { .. })));
        assert_eq!(migration.state(), MigrationState::InProgress);
        assert!(!broken.is_migration_completed().unwrap());
        assert!(broken.public_keys().unwrap().is_empty());
    }
}
