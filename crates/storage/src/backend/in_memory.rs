use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard};

use crate::api::{Error, PrefixResult, StorageBackend, StorageReadView, StorageWriteBatch, Table};

type TableData = BTreeMap<Vec<u8>, Vec<u8>>;
type StorageData = HashMap<Table, TableData>;

/// A pending change to a single key.
enum Op {
    Put(Vec<u8>),
    Delete,
}

/// In-memory storage backend using ordered maps.
///
/// Readers share a read lock for the lifetime of their view, so they always
/// see a consistent snapshot. Commits take the write lock.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    data: Arc<RwLock<StorageData>>,
}

impl InMemoryBackend {
    /// Create a new empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for InMemoryBackend {
    fn begin_read(&self) -> Result<Box<dyn StorageReadView + '_>, Error> {
        let guard = self.data.read().map_err(|e| e.to_string())?;
        Ok(Box::new(InMemoryReadView { guard }))
    }

    fn begin_write(&self) -> Result<Box<dyn StorageWriteBatch + 'static>, Error> {
        Ok(Box::new(InMemoryWriteBatch {
            data: Arc::clone(&self.data),
            ops: Vec::new(),
        }))
    }
}

/// Read view holding a read lock on the storage data.
struct InMemoryReadView<'a> {
    guard: RwLockReadGuard<'a, StorageData>,
}

impl StorageReadView for InMemoryReadView<'_> {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.guard.get(&table).and_then(|t| t.get(key)).cloned())
    }

    fn prefix_iterator(
        &self,
        table: Table,
        prefix: &[u8],
    ) -> Result<Box<dyn Iterator<Item = PrefixResult> + '_>, Error> {
        let Some(data) = self.guard.get(&table) else {
            return Ok(Box::new(std::iter::empty()));
        };
        let prefix_owned = prefix.to_vec();
        let iter = data
            .range(prefix.to_vec()..)
            .take_while(move |(k, _)| k.starts_with(&prefix_owned))
            .map(|(k, v)| Ok((k.clone().into_boxed_slice(), v.clone().into_boxed_slice())));

        Ok(Box::new(iter))
    }
}

/// Write batch that records changes in order and applies them on commit.
struct InMemoryWriteBatch {
    data: Arc<RwLock<StorageData>>,
    ops: Vec<(Table, Vec<u8>, Op)>,
}

impl StorageWriteBatch for InMemoryWriteBatch {
    fn put_batch(&mut self, table: Table, batch: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), Error> {
        self.ops
            .extend(batch.into_iter().map(|(k, v)| (table, k, Op::Put(v))));
        Ok(())
    }

    fn delete_batch(&mut self, table: Table, keys: Vec<Vec<u8>>) -> Result<(), Error> {
        self.ops
            .extend(keys.into_iter().map(|k| (table, k, Op::Delete)));
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), Error> {
        let mut guard = self.data.write().map_err(|e| e.to_string())?;

        // Applied in call order, so the last operation on a key wins
        for (table, key, op) in self.ops {
            let table_data = guard.entry(table).or_default();
            match op {
                Op::Put(value) => {
                    table_data.insert(key, value);
                }
                Op::Delete => {
                    table_data.remove(&key);
                }
            }
        }

        Ok(())
    }
}
