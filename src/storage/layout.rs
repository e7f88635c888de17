use std::fs;
use std::path::PathBuf;

use crate::core::error::Result;

/// Directory structure for on-disk state: SSTable files, WAL segments, and
/// kernel metadata.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,
    pub sstable_dir: PathBuf,
    pub wal_dir: PathBuf,
    pub meta_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        let sstable_dir = base_dir.join("sstables");
        let wal_dir = base_dir.join("wal");
        let meta_dir = base_dir.join("meta");

        fs::create_dir_all(&sstable_dir)?;
        fs::create_dir_all(&wal_dir)?;
        fs::create_dir_all(&meta_dir)?;

        Ok(StorageLayout { base_dir, sstable_dir, wal_dir, meta_dir })
    }

    /// Filename pattern `sstable_<id>.sst` — the canonical compatibility
    /// boundary named in the external-interfaces contract.
    pub fn sstable_path(&self, id: u64) -> PathBuf {
        self.sstable_dir.join(format!("sstable_{id}.sst"))
    }

    pub fn wal_path(&self, sequence: u64) -> PathBuf {
        self.wal_dir.join(format!("wal_{sequence:08}.log"))
    }

    pub fn wal_dir(&self) -> &PathBuf {
        &self.wal_dir
    }

    pub fn sstable_dir(&self) -> &PathBuf {
        &self.sstable_dir
    }
}
