//! RocksDB storage backend.

use crate::api::{
    ALL_TABLES, Error, PrefixResult, StorageBackend, StorageReadView, StorageWriteBatch, Table,
};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, SnapshotWithThreadMode, WriteBatch, WriteOptions,
};
use std::path::Path;
use std::sync::Arc;

type DB = DBWithThreadMode<MultiThreaded>;

/// Returns the column family name for a table.
fn cf_name(table: Table) -> &'static str {
    match table {
        Table::AttestationHistory => "attestation_history",
        Table::LegacyAttestationHistory => "legacy_attestation_history",
    }
}

fn cf_handle(db: &DB, table: Table) -> Result<Arc<BoundColumnFamily<'_>>, Error> {
    db.cf_handle(cf_name(table))
        .ok_or_else(|| format!("Column family {} not found", cf_name(table)).into())
}

/// RocksDB storage backend.
#[derive(Clone)]
pub struct RocksDBBackend {
    db: Arc<DB>,
}

impl RocksDBBackend {
    /// Open a RocksDB database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = ALL_TABLES
            .iter()
            .map(|t| ColumnFamilyDescriptor::new(cf_name(*t), Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl StorageBackend for RocksDBBackend {
    fn begin_read(&self) -> Result<Box<dyn StorageReadView + '_>, Error> {
        Ok(Box::new(RocksDBReadView {
            db: &self.db,
            snapshot: self.db.snapshot(),
        }))
    }

    fn begin_write(&self) -> Result<Box<dyn StorageWriteBatch + 'static>, Error> {
        Ok(Box::new(RocksDBWriteBatch {
            db: Arc::clone(&self.db),
            batch: WriteBatch::default(),
        }))
    }
}

/// Read-only view over a RocksDB snapshot.
struct RocksDBReadView<'a> {
    db: &'a DB,
    snapshot: SnapshotWithThreadMode<'a, DB>,
}

impl StorageReadView for RocksDBReadView<'_> {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let cf = cf_handle(self.db, table)?;
        Ok(self.snapshot.get_cf(&cf, key)?)
    }

    fn prefix_iterator(
        &self,
        table: Table,
        prefix: &[u8],
    ) -> Result<Box<dyn Iterator<Item = PrefixResult> + '_>, Error> {
        let cf = cf_handle(self.db, table)?;

        let prefix_owned = prefix.to_vec();
        let iter = self
            .snapshot
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward))
            .map(|result| result.map_err(|e| Box::new(e) as Error))
            .take_while(move |result| match result {
                Ok((key, _)) => key.starts_with(&prefix_owned),
                Err(_) => true, // propagate errors
            });

        Ok(Box::new(iter))
    }
}

/// Write batch for RocksDB.
struct RocksDBWriteBatch {
    db: Arc<DB>,
    batch: WriteBatch,
}

impl RocksDBWriteBatch {
    fn with_cf<F>(&mut self, table: Table, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut WriteBatch, &Arc<BoundColumnFamily<'_>>),
    {
        let cf = cf_handle(&self.db, table)?;
        f(&mut self.batch, &cf);
        Ok(())
    }
}

impl StorageWriteBatch for RocksDBWriteBatch {
    fn put_batch(&mut self, table: Table, batch: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), Error> {
        self.with_cf(table, |write_batch, cf| {
            for (key, value) in batch {
                write_batch.put_cf(cf, key, value);
            }
        })
    }

    fn delete_batch(&mut self, table: Table, keys: Vec<Vec<u8>>) -> Result<(), Error> {
        self.with_cf(table, |write_batch, cf| {
            for key in keys {
                write_batch.delete_cf(cf, key);
            }
        })
    }

    fn commit(self: Box<Self>) -> Result<(), Error> {
        // A signed attestation must not be forgotten if the process dies right after
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(true);

        self.db.write_opt(self.batch, &write_opts)?;
        Ok(())
    }
}
