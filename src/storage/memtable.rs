use std::path::Path;

use crate::core::error::Result;
use crate::storage::layout::StorageLayout;
use crate::storage::skiplist::SkipListMap;
use crate::storage::sstable::{Entry, SSTableWriter};
use crate::storage::wal::{Wal, WalRecord};

/// In-memory write buffer: a SkipList of the most recent value per key, with
/// a WAL appended before every mutation for crash durability. A flush
/// transfers the skip list's level-0 chain (already in key order) to a new
/// SSTable, then the MemTable is discarded.
///
/// Each skip-list value is the bincode encoding of a `StoredValue` rather
/// than a raw byte string, so a present-but-empty value can never be
/// mistaken for a tombstone.
pub struct MemTable {
    skiplist: SkipListMap,
    wal: Wal,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StoredValue {
    value: Option<Vec<u8>>,
    timestamp: i64,
}

impl MemTable {
    pub fn open(storage: &StorageLayout, wal_sequence: u64) -> Result<Self> {
        let wal = Wal::open(storage, wal_sequence)?;
        Ok(MemTable { skiplist: SkipListMap::new(), wal })
    }

    /// Rebuilds a MemTable by replaying a WAL file, for crash recovery.
    pub fn recover(storage: &StorageLayout, wal_sequence: u64) -> Result<Self> {
        let mut skiplist = SkipListMap::new();
        let wal_path = storage.wal_path(wal_sequence);
        Wal::replay(&wal_path, |record| {
            let stored = StoredValue { value: record.value, timestamp: record.timestamp };
            let encoded = bincode::serialize(&stored).unwrap_or_default();
            skiplist.insert(record.key, encoded);
        })?;
        let wal = Wal::open(storage, wal_sequence)?;
        Ok(MemTable { skiplist, wal })
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>, timestamp: i64) -> Result<()> {
        self.wal.append(&WalRecord { key: key.clone(), value: Some(value.clone()), timestamp, deleted: false })?;
        let stored = StoredValue { value: Some(value), timestamp };
        self.skiplist.insert(key, bincode::serialize(&stored)?);
        Ok(())
    }

    pub fn delete(&mut self, key: Vec<u8>, timestamp: i64) -> Result<()> {
        self.wal.append(&WalRecord { key: key.clone(), value: None, timestamp, deleted: true })?;
        let stored = StoredValue { value: None, timestamp };
        self.skiplist.insert(key, bincode::serialize(&stored)?);
        Ok(())
    }

    /// Returns `Some(None)` for a tombstone (key was deleted), `Some(Some(v))`
    /// for a live value, `None` if the key has never been written.
    pub fn get(&self, key: &[u8]) -> Option<Option<Vec<u8>>> {
        let raw = self.skiplist.search(key)?;
        let stored: StoredValue = bincode::deserialize(raw).ok()?;
        Some(stored.value)
    }

    pub fn len(&self) -> usize {
        self.skiplist.size()
    }

    pub fn is_empty(&self) -> bool {
        self.skiplist.is_empty()
    }

    /// Flushes the level-0 chain into a new SSTable at `path`, consuming the
    /// MemTable.
    pub fn flush_to_sstable(self, path: impl AsRef<Path>, index_interval: usize) -> Result<()> {
        let raw_entries: Vec<(Vec<u8>, Vec<u8>)> =
            self.skiplist.iter().map(|(k, v)| (k.to_vec(), v.to_vec())).collect();
        let mut writer = SSTableWriter::create(path, raw_entries.len(), index_interval)?;
        for (key, raw) in raw_entries {
            let stored: StoredValue = bincode::deserialize(&raw)?;
            let entry = match stored.value {
                Some(v) => Entry::put(key, v, stored.timestamp),
                None => Entry::tombstone(key, stored.timestamp),
            };
            writer.append(&entry)?;
        }
        writer.finalize()
    }
}
