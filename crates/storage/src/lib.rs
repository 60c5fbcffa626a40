mod api;
pub mod backend;
pub mod metrics;
mod migration;
mod store;
mod types;

pub use api::{Error, PrefixResult, StorageBackend, StorageReadView, StorageWriteBatch, Table};
pub use migration::{
    AttestationMigration, MIGRATED_SIGNING_ROOT, MigrationError, MigrationOutcome, MigrationState,
    convert_legacy_history,
};
pub use store::{MIGRATION_COMPLETED_KEY, SlashingProtectionStore, StoreError};
pub use types::{LegacyAttestationHistory, LegacyTargetSource};
