use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::bloom::BloomFilter;

/// A single MemTable entry as persisted in an SSTable record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
    pub timestamp: i64,
    pub deleted: bool,
}

impl Entry {
    pub fn put(key: Vec<u8>, value: Vec<u8>, timestamp: i64) -> Self {
        Entry { key, value: Some(value), timestamp, deleted: false }
    }

    pub fn tombstone(key: Vec<u8>, timestamp: i64) -> Self {
        Entry { key, value: None, timestamp, deleted: true }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.key.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.key);
        let value_len = self.value.as_ref().map(|v| v.len()).unwrap_or(0) as u32;
        out.extend_from_slice(&value_len.to_le_bytes());
        if let Some(v) = &self.value {
            out.extend_from_slice(v);
        }
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.push(if self.deleted { 1 } else { 0 });
    }

    fn encoded_len(&self) -> usize {
        4 + self.key.len() + 4 + self.value.as_ref().map(|v| v.len()).unwrap_or(0) + 8 + 1
    }
}

pub(crate) struct SparseIndexEntry {
    key: Vec<u8>,
    offset: u64,
}

/// Writes a monotonically non-decreasing stream of entries to an immutable
/// on-disk sorted table. The footer — containing the sparse index, min/max
/// key, and Bloom filter — is appended only at `finalize()`, after all data;
/// a trailing 4-byte length lets the reader seek from the end. This is the
/// opposite of a header-first layout: an interrupted write never produces a
/// file whose header claims more than was actually flushed.
pub struct SSTableWriter {
    file: BufWriter<File>,
    path: PathBuf,
    bloom: BloomFilter,
    sparse_index: Vec<SparseIndexEntry>,
    index_interval: usize,
    min_key: Option<Vec<u8>>,
    max_key: Option<Vec<u8>>,
    num_entries: u32,
    offset: u64,
    last_key: Option<Vec<u8>>,
}

impl SSTableWriter {
    pub fn create(path: impl AsRef<Path>, expected_entries: usize, index_interval: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(SSTableWriter {
            file: BufWriter::new(file),
            path,
            bloom: BloomFilter::new(expected_entries.max(1), 7),
            sparse_index: Vec::new(),
            index_interval: index_interval.max(1),
            min_key: None,
            max_key: None,
            num_entries: 0,
            offset: 0,
            last_key: None,
        })
    }

    pub fn append(&mut self, entry: &Entry) -> Result<()> {
        if let Some(last) = &self.last_key {
            if entry.key <= *last {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    "SSTable entries must be written in strictly increasing key order",
                ));
            }
        }

        if self.num_entries as usize % self.index_interval == 0 {
            self.sparse_index.push(SparseIndexEntry { key: entry.key.clone(), offset: self.offset });
        }

        let mut buf = Vec::with_capacity(entry.encoded_len());
        entry.encode(&mut buf);
        self.file.write_all(&buf)?;
        self.offset += buf.len() as u64;

        self.bloom.add(&entry.key);
        if self.min_key.is_none() {
            self.min_key = Some(entry.key.clone());
        }
        self.max_key = Some(entry.key.clone());
        self.last_key = Some(entry.key.clone());
        self.num_entries += 1;
        Ok(())
    }

    /// Writes the trailing footer, fsyncs, and closes the file.
    pub fn finalize(mut self) -> Result<()> {
        let mut footer = Vec::new();
        footer.extend_from_slice(&self.num_entries.to_le_bytes());

        let min_key = self.min_key.take().unwrap_or_default();
        let max_key = self.max_key.take().unwrap_or_default();
        footer.extend_from_slice(&(min_key.len() as u32).to_le_bytes());
        footer.extend_from_slice(&min_key);
        footer.extend_from_slice(&(max_key.len() as u32).to_le_bytes());
        footer.extend_from_slice(&max_key);

        footer.extend_from_slice(&(self.sparse_index.len() as u32).to_le_bytes());
        for e in &self.sparse_index {
            footer.extend_from_slice(&(e.key.len() as u32).to_le_bytes());
            footer.extend_from_slice(&e.key);
            footer.extend_from_slice(&e.offset.to_le_bytes());
        }

        let bloom_bytes = self.bloom.marshal();
        footer.extend_from_slice(&(bloom_bytes.len() as u32).to_le_bytes());
        footer.extend_from_slice(&bloom_bytes);

        let footer_len = footer.len() as u32;

        self.file.write_all(&footer)?;
        self.file.write_all(&footer_len.to_le_bytes())?;
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub struct Footer {
    pub num_entries: u32,
    pub min_key: Vec<u8>,
    pub max_key: Vec<u8>,
    pub sparse_index: Vec<SparseIndexEntry>,
    pub bloom: BloomFilter,
    pub data_end: u64,
}

/// Opens an SSTable file, parsing the trailing footer to recover the sparse
/// index, Bloom filter and key bounds. A fresh `File` handle is opened per
/// `get()` call (per the "opened per read" resource policy); only the
/// footer-derived metadata is cached at open time.
pub struct SSTableReader {
    path: PathBuf,
    footer: Footer,
}

impl SSTableReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let file_len = file.metadata()?.len();
        if file_len < 4 {
            return Err(Error::new(ErrorKind::InvalidData, "file too short to contain a footer"));
        }

        file.seek(SeekFrom::End(-4))?;
        let mut len_buf = [0u8; 4];
        file.read_exact(&mut len_buf)?;
        let footer_len = u32::from_le_bytes(len_buf) as u64;

        if footer_len + 4 > file_len {
            return Err(Error::new(ErrorKind::InvalidData, "corrupt SSTable footer length"));
        }
        let footer_start = file_len - 4 - footer_len;
        file.seek(SeekFrom::Start(footer_start))?;
        let mut footer_buf = vec![0u8; footer_len as usize];
        file.read_exact(&mut footer_buf)?;

        let footer = Self::parse_footer(&footer_buf, footer_start)?;
        Ok(SSTableReader { path, footer })
    }

    fn parse_footer(buf: &[u8], data_end: u64) -> Result<Footer> {
        let mut pos = 0usize;
        let need = |buf: &[u8], pos: usize, n: usize| -> Result<()> {
            if buf.len() < pos + n {
                Err(Error::new(ErrorKind::InvalidData, "corrupt SSTable footer"))
            } else {
                Ok(())
            }
        };

        need(buf, pos, 4)?;
        let num_entries = u32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap());
        pos += 4;

        need(buf, pos, 4)?;
        let min_len = u32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;
        need(buf, pos, min_len)?;
        let min_key = buf[pos..pos + min_len].to_vec();
        pos += min_len;

        need(buf, pos, 4)?;
        let max_len = u32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;
        need(buf, pos, max_len)?;
        let max_key = buf[pos..pos + max_len].to_vec();
        pos += max_len;

        need(buf, pos, 4)?;
        let num_index_entries = u32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;
        let mut sparse_index = Vec::with_capacity(num_index_entries);
        for _ in 0..num_index_entries {
            need(buf, pos, 4)?;
            let klen = u32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap()) as usize;
            pos += 4;
            need(buf, pos, klen + 8)?;
            let key = buf[pos..pos + klen].to_vec();
            pos += klen;
            let offset = u64::from_le_bytes(buf[pos..pos + 8].try_into().unwrap());
            pos += 8;
            sparse_index.push(SparseIndexEntry { key, offset });
        }

        need(buf, pos, 4)?;
        let bloom_len = u32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;
        need(buf, pos, bloom_len)?;
        let bloom = BloomFilter::unmarshal(&buf[pos..pos + bloom_len])?;

        Ok(Footer { num_entries, min_key, max_key, sparse_index, bloom, data_end })
    }

    pub fn min_key(&self) -> &[u8] {
        &self.footer.min_key
    }

    pub fn max_key(&self) -> &[u8] {
        &self.footer.max_key
    }

    pub fn num_entries(&self) -> u32 {
        self.footer.num_entries
    }

    /// Binary-search the sparse index for the greatest index entry whose key
    /// is <= the target, returning its byte offset (or 0 if none).
    fn seek_offset_for(&self, key: &[u8]) -> u64 {
        let idx = &self.footer.sparse_index;
        if idx.is_empty() {
            return 0;
        }
        let mut lo = 0i64;
        let mut hi = idx.len() as i64 - 1;
        let mut best = 0u64;
        while lo <= hi {
            let mid = (lo + hi) / 2;
            if idx[mid as usize].key.as_slice() <= key {
                best = idx[mid as usize].offset;
                lo = mid + 1;
            } else {
                hi = mid - 1;
            }
        }
        best
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        if !self.footer.bloom.contains(key) {
            return Ok(None);
        }
        if key < self.footer.min_key.as_slice() || key > self.footer.max_key.as_slice() {
            return Ok(None);
        }

        let mut file = File::open(&self.path)?;
        let offset = self.seek_offset_for(key);
        file.seek(SeekFrom::Start(offset))?;

        let mut cursor = offset;
        loop {
            if cursor >= self.footer.data_end {
                return Ok(None);
            }
            let (entry, consumed) = Self::read_one(&mut file)?;
            cursor += consumed as u64;
            match entry.key.as_slice().cmp(key) {
                std::cmp::Ordering::Equal => return Ok(Some(entry)),
                std::cmp::Ordering::Greater => return Ok(None),
                std::cmp::Ordering::Less => continue,
            }
        }
    }

    fn read_one(file: &mut File) -> Result<(Entry, usize)> {
        let mut key_len_buf = [0u8; 4];
        file.read_exact(&mut key_len_buf)?;
        let key_len = u32::from_le_bytes(key_len_buf) as usize;

        let mut key = vec![0u8; key_len];
        file.read_exact(&mut key)?;

        let mut value_len_buf = [0u8; 4];
        file.read_exact(&mut value_len_buf)?;
        let value_len = u32::from_le_bytes(value_len_buf) as usize;

        let mut value = vec![0u8; value_len];
        file.read_exact(&mut value)?;

        let mut ts_buf = [0u8; 8];
        file.read_exact(&mut ts_buf)?;
        let timestamp = i64::from_le_bytes(ts_buf);

        let mut deleted_buf = [0u8; 1];
        file.read_exact(&mut deleted_buf)?;
        let deleted = deleted_buf[0] != 0;

        let consumed = 4 + key_len + 4 + value_len + 8 + 1;
        let value = if deleted { None } else { Some(value) };
        Ok((Entry { key, value, timestamp, deleted }, consumed))
    }

    /// Forward cursor yielding entries in insertion order until data_end.
    pub fn iterator(&self) -> Result<SSTableIterator> {
        let file = File::open(&self.path)?;
        Ok(SSTableIterator { file, offset: 0, data_end: self.footer.data_end })
    }
}

pub struct SSTableIterator {
    file: File,
    offset: u64,
    data_end: u64,
}

impl SSTableIterator {
    /// Explicit release, kept for symmetry with the spec's "must be closed"
    /// contract even though `Drop` already releases the handle.
    pub fn close(self) {}
}

impl Iterator for SSTableIterator {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.data_end {
            return None;
        }
        match SSTableReader::read_one(&mut self.file) {
            Ok((entry, consumed)) => {
                self.offset += consumed as u64;
                Some(Ok(entry))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Deletes any file under `dir` matching `sstable_*.sst` whose footer cannot
/// be parsed — the recovery-time cleanup for writes interrupted before
/// `finalize()`.
pub fn delete_incomplete_sstables(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    if !dir.as_ref().exists() {
        return Ok(removed);
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_sstable = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("sstable_") && n.ends_with(".sst"))
            .unwrap_or(false);
        if !is_sstable {
            continue;
        }
        if SSTableReader::open(&path).is_err() {
            fs::remove_file(&path)?;
            removed.push(path);
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_write_read_iterate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sstable_1.sst");

        let mut writer = SSTableWriter::create(&path, 3, 10).unwrap();
        writer.append(&Entry::put(b"apple".to_vec(), b"red".to_vec(), 1)).unwrap();
        writer.append(&Entry::put(b"banana".to_vec(), b"yellow".to_vec(), 2)).unwrap();
        writer.append(&Entry::put(b"cherry".to_vec(), b"red".to_vec(), 3)).unwrap();
        writer.finalize().unwrap();

        let reader = SSTableReader::open(&path).unwrap();
        let got = reader.get(b"banana").unwrap().unwrap();
        assert_eq!(got.value, Some(b"yellow".to_vec()));
        assert_eq!(got.timestamp, 2);
        assert!(!got.deleted);

        let entries: Vec<Entry> = reader.iterator().unwrap().map(|e| e.unwrap()).collect();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].key, b"apple");
        assert_eq!(entries[2].key, b"cherry");

        assert_eq!(reader.get(b"durian").unwrap(), None);
    }

    #[test]
    fn append_out_of_order_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sstable_2.sst");
        let mut writer = SSTableWriter::create(&path, 2, 10).unwrap();
        writer.append(&Entry::put(b"b".to_vec(), vec![], 1)).unwrap();
        let err = writer.append(&Entry::put(b"a".to_vec(), vec![], 2)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn sparse_index_handles_many_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sstable_3.sst");
        let mut writer = SSTableWriter::create(&path, 1000, 10).unwrap();
        for i in 0..1000u32 {
            let key = format!("{:06}", i).into_bytes();
            writer.append(&Entry::put(key, i.to_le_bytes().to_vec(), i as i64)).unwrap();
        }
        writer.finalize().unwrap();

        let reader = SSTableReader::open(&path).unwrap();
        for i in [0u32, 1, 500, 999] {
            let key = format!("{:06}", i).into_bytes();
            let got = reader.get(&key).unwrap().unwrap();
            assert_eq!(got.value, Some(i.to_le_bytes().to_vec()));
        }
        assert!(reader.get(b"999999").unwrap().is_none());
    }

    #[test]
    fn tombstone_round_trips_with_no_value() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sstable_4.sst");
        let mut writer = SSTableWriter::create(&path, 1, 10).unwrap();
        writer.append(&Entry::tombstone(b"gone".to_vec(), 5)).unwrap();
        writer.finalize().unwrap();

        let reader = SSTableReader::open(&path).unwrap();
        let got = reader.get(b"gone").unwrap().unwrap();
        assert!(got.deleted);
        assert_eq!(got.value, None);
    }

    #[test]
    fn open_rejects_truncated_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sstable_5.sst");
        fs::write(&path, b"ab").unwrap();
        assert!(SSTableReader::open(&path).is_err());
    }

    #[test]
    fn incomplete_sstable_is_deleted_on_recovery() {
        let dir = tempdir().unwrap();
        let good_path = dir.path().join("sstable_good.sst");
        let mut writer = SSTableWriter::create(&good_path, 1, 10).unwrap();
        writer.append(&Entry::put(b"k".to_vec(), b"v".to_vec(), 1)).unwrap();
        writer.finalize().unwrap();

        let bad_path = dir.path().join("sstable_bad.sst");
        fs::write(&bad_path, b"not a real sstable file at all").unwrap();

        let removed = delete_incomplete_sstables(dir.path()).unwrap();
        assert_eq!(removed, vec![bad_path.clone()]);
        assert!(good_path.exists());
        assert!(!bad_path.exists());
    }
}
