/// Tables in the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    /// Attestation history: ValidatorPubkeyBytes -> EncodedHistory bytes
    AttestationHistory,
    /// Attestation history in the pre-ring-buffer format:
    /// ValidatorPubkeyBytes -> LegacyAttestationHistory (SSZ)
    ///
    /// Only read by the migration. It also holds the migration completion
    /// marker under [`crate::MIGRATION_COMPLETED_KEY`].
    LegacyAttestationHistory,
}

/// All table variants.
#[cfg(any(feature = "rocksdb", test))]
pub const ALL_TABLES: [Table; 2] = [Table::AttestationHistory, Table::LegacyAttestationHistory];
