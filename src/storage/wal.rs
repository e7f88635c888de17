use std::fs::{File, OpenOptions};
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::storage::layout::StorageLayout;

/// Write-ahead log for MemTable durability. Treated as an opaque
/// collaborator by the rest of the kernel: it only needs to replay the
/// byte-sequence key/value/timestamp/deleted shape of a MemTable entry, not
/// anything about documents.
pub struct Wal {
    pub file: File,
    pub position: u64,
    pub sync_mode: SyncMode,
    pub sequence: u64,
}

#[derive(Debug, Clone, Copy)]
pub enum SyncMode {
    Immediate,
    Batch,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalRecord {
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
    pub timestamp: i64,
    pub deleted: bool,
}

impl Wal {
    pub fn open(storage: &StorageLayout, sequence: u64) -> Result<Self> {
        let path = storage.wal_path(sequence);
        let file = OpenOptions::new().create(true).append(true).read(true).open(path)?;

        Ok(Wal { file, position: 0, sync_mode: SyncMode::Batch, sequence })
    }

    pub fn append(&mut self, record: &WalRecord) -> Result<()> {
        let data = bincode::serialize(record)?;
        let len = data.len() as u32;

        self.file.write_all(&len.to_le_bytes())?;
        self.file.write_all(&data)?;
        self.position += 4 + data.len() as u64;

        match self.sync_mode {
            SyncMode::Immediate => self.file.sync_all()?,
            SyncMode::Batch if self.position % (1024 * 1024) == 0 => self.file.sync_all()?,
            _ => {}
        }

        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    pub fn rotate(&mut self, storage: &StorageLayout) -> Result<()> {
        self.sync()?;
        let new_wal = Wal::open(storage, self.sequence + 1)?;
        *self = new_wal;
        Ok(())
    }

    /// Replays every record in this log, in append order, invoking `f` for
    /// each. Used by recovery to rebuild the MemTable before the next write.
    pub fn replay(path: impl AsRef<std::path::Path>, mut f: impl FnMut(WalRecord)) -> Result<()> {
        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        loop {
            let mut len_buf = [0u8; 4];
            match file.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            let mut buf = vec![0u8; len];
            match file.read_exact(&mut buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let record: WalRecord = match bincode::deserialize(&buf) {
                Ok(r) => r,
                Err(_) => break, // partial trailing write; stop replay here
            };
            f(record);
        }
        Ok(())
    }
}
