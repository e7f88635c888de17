use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::analysis::Analyzer;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::value::{CompositeKey, Document, ObjectId, Value};
use crate::index::secondary::{Key, SecondaryIndex};
use crate::query::executor::{DocumentStore, QueryExecutor, QueryOptions};
use crate::query::filter::Filter;
use crate::query::planner::{QueryPlan, QueryPlanner};
use crate::search::inverted::InvertedIndex;
use crate::storage::file_lock::FileLock;
use crate::storage::layout::StorageLayout;
use crate::storage::memtable::MemTable;
use crate::storage::sstable::{delete_incomplete_sstables, SSTableReader};

/// Composition root: owns every index, the active write buffer, the on-disk
/// SSTables, and the document table, and wires query planning to execution.
pub struct Database {
    config: Config,
    storage: StorageLayout,
    _lock: FileLock,

    indexes: RwLock<HashMap<String, Arc<SecondaryIndex>>>,
    text_fields: RwLock<Vec<String>>,

    memtable: Mutex<MemTable>,
    sstables: RwLock<Vec<SSTableReader>>,
    documents: RwLock<HashMap<String, Document>>,
    inverted: RwLock<InvertedIndex>,

    next_sstable_id: AtomicU64,
    wal_sequence: AtomicU64,
}

struct DocMapStore<'a> {
    documents: &'a HashMap<String, Document>,
}

impl<'a> DocumentStore for DocMapStore<'a> {
    fn iter(&self) -> Vec<&Document> {
        self.documents.values().collect()
    }

    fn get_by_id(&self, doc_id: &str) -> Option<&Document> {
        self.documents.get(doc_id)
    }
}

impl Database {
    /// Opens (creating if absent) the data directory at `config.storage_path`
    /// and replays its SSTables. Takes an exclusive file lock for the
    /// process lifetime of the returned `Database`; a second `open` on the
    /// same directory fails rather than risking concurrent writers.
    pub fn open(config: Config) -> Result<Self> {
        let storage = StorageLayout::new(config.storage_path.clone())?;
        let lock = FileLock::acquire(&storage, true)?;
        let memtable = MemTable::open(&storage, 0)?;
        let db = Database {
            config,
            storage,
            _lock: lock,
            indexes: RwLock::new(HashMap::new()),
            text_fields: RwLock::new(Vec::new()),
            memtable: Mutex::new(memtable),
            sstables: RwLock::new(Vec::new()),
            documents: RwLock::new(HashMap::new()),
            inverted: RwLock::new(InvertedIndex::new(Analyzer::default())),
            next_sstable_id: AtomicU64::new(0),
            wal_sequence: AtomicU64::new(0),
        };
        db.recover()?;
        Ok(db)
    }

    pub fn register_index(&self, index: SecondaryIndex) {
        self.indexes.write().insert(index.name().to_string(), Arc::new(index));
    }

    pub fn register_text_field(&self, field: impl Into<String>) {
        self.text_fields.write().push(field.into());
    }

    /// Assigns `_id` if absent, updates every secondary index whose field(s)
    /// the document carries, writes the MemTable entry, indexes registered
    /// text fields, and flushes when the threshold is crossed.
    pub fn insert(&self, mut doc: Document) -> Result<String> {
        if doc.id().is_none() {
            doc.set("_id", Value::ObjectId(ObjectId::generate()));
        }
        let id = doc.id_string().ok_or_else(|| Error::new(ErrorKind::InvalidArgument, "_id must be a string or ObjectId"))?;

        for index in self.indexes.read().values() {
            if let Some(key) = key_for_document(index, &doc) {
                index.insert(key, id.clone())?;
            }
        }

        for field in self.text_fields.read().iter() {
            if let Some(Value::Str(text)) = doc.get(field) {
                self.inverted.write().index(&id, text);
            }
        }

        let encoded = bincode::serialize(&doc)?;
        self.memtable.lock().put(id.clone().into_bytes(), encoded, now_millis())?;
        self.documents.write().insert(id.clone(), doc);

        if self.memtable.lock().len() >= self.config.memtable_flush_threshold {
            self.flush()?;
        }
        Ok(id)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let removed = self.documents.write().remove(id);
        if let Some(doc) = &removed {
            for index in self.indexes.read().values() {
                if let Some(key) = key_for_document(index, doc) {
                    index.delete_doc(&key, id);
                }
            }
            self.inverted.write().remove(id);
        }
        self.memtable.lock().delete(id.as_bytes().to_vec(), now_millis())?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Document> {
        self.documents.read().get(id).cloned()
    }

    pub fn find(
        &self,
        filter: &Filter,
        projection: Option<&HashMap<String, bool>>,
        options: &QueryOptions,
    ) -> Result<Vec<Document>> {
        let indexes = self.indexes.read();
        let planner = QueryPlanner::new(indexes.clone());
        let plan = planner.plan(filter, projection);
        let documents = self.documents.read();
        let store = DocMapStore { documents: &documents };
        let executor = QueryExecutor::new(&indexes);
        executor.execute(&plan, filter, &store, options)
    }

    pub fn search_text(&self, query: &str) -> Vec<(String, f32)> {
        self.inverted.read().search(query)
    }

    /// Builds the plan a `find` call with these arguments would execute,
    /// without running it.
    pub fn explain(&self, filter: &Filter, projection: Option<&HashMap<String, bool>>) -> QueryPlan {
        let indexes = self.indexes.read();
        QueryPlanner::new(indexes.clone()).plan(filter, projection)
    }

    /// Finalizes the active MemTable into a new SSTable and replaces it with
    /// an empty one. A no-op when the MemTable is empty.
    pub fn flush(&self) -> Result<()> {
        let mut mt_guard = self.memtable.lock();
        if mt_guard.is_empty() {
            return Ok(());
        }
        let sstable_id = self.next_sstable_id.fetch_add(1, Ordering::SeqCst);
        let path = self.storage.sstable_path(sstable_id);
        let wal_sequence = self.wal_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let fresh = MemTable::open(&self.storage, wal_sequence)?;
        let old = std::mem::replace(&mut *mt_guard, fresh);
        drop(mt_guard);

        old.flush_to_sstable(&path, self.config.sstable_index_interval)?;
        println!("flushed memtable to {}", path.display());
        let reader = SSTableReader::open(&path)?;
        self.sstables.write().insert(0, reader);
        Ok(())
    }

    /// Deletes any SSTable left without a readable footer, reopens the rest,
    /// and replays the WAL into a fresh MemTable, rebuilding the document
    /// table and secondary indexes by scanning every live entry.
    fn recover(&self) -> Result<()> {
        let removed = delete_incomplete_sstables(self.storage.sstable_dir())?;
        for path in &removed {
            eprintln!("recovery: discarded incomplete sstable {}", path.display());
        }

        let mut readers = Vec::new();
        let mut max_id = None;
        if let Ok(entries) = std::fs::read_dir(self.storage.sstable_dir()) {
            let mut paths: Vec<_> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
            paths.sort_by_key(|p| sstable_id(p).unwrap_or(0));
            for path in paths {
                max_id = max_id.max(sstable_id(&path));
                if let Ok(reader) = SSTableReader::open(&path) {
                    readers.push(reader);
                }
            }
        }
        readers.reverse();
        if let Some(id) = max_id {
            self.next_sstable_id.store(id + 1, Ordering::SeqCst);
        }

        let mut documents = HashMap::new();
        for reader in readers.iter().rev() {
            if let Ok(iter) = reader.iterator() {
                for entry in iter.flatten() {
                    let id = String::from_utf8_lossy(&entry.key).to_string();
                    if entry.deleted {
                        documents.remove(&id);
                    } else if let Some(value) = &entry.value {
                        if let Ok(doc) = bincode::deserialize::<Document>(value) {
                            documents.insert(id, doc);
                        }
                    }
                }
            }
        }

        *self.sstables.write() = readers;
        for (id, doc) in &documents {
            for index in self.indexes.read().values() {
                if let Some(key) = key_for_document(index, doc) {
                    let _ = index.insert(key, id.clone());
                }
            }
        }
        *self.documents.write() = documents;
        println!("recovery complete: {} sstables, {} documents", self.sstables.read().len(), self.documents.read().len());
        Ok(())
    }
}

fn key_for_document(index: &SecondaryIndex, doc: &Document) -> Option<Key> {
    if index.is_compound() {
        let mut values = Vec::with_capacity(index.field_paths().len());
        for field in index.field_paths() {
            values.push(doc.get(field)?.clone());
        }
        Some(Key::Composite(CompositeKey::new(values)))
    } else {
        doc.get(index.field_path()).map(|v| Key::Scalar(v.clone()))
    }
}

fn sstable_id(path: &std::path::Path) -> Option<u64> {
    path.file_stem()?.to_str()?.strip_prefix("sstable_")?.parse().ok()
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn doc(id: &str, fields: &[(&str, Value)]) -> Document {
        let mut d = Document::new();
        d.set("_id", Value::Str(id.to_string()));
        for (k, v) in fields {
            d.set(*k, v.clone());
        }
        d
    }

    #[test]
    fn insert_then_get_roundtrips() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.storage_path = dir.path().to_path_buf();
        let db = Database::open(config).unwrap();
        db.insert(doc("doc1", &[("age", Value::I64(30))])).unwrap();
        let fetched = db.get("doc1").unwrap();
        assert_eq!(fetched.get("age"), Some(&Value::I64(30)));
    }

    #[test]
    fn insert_without_id_generates_one() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.storage_path = dir.path().to_path_buf();
        let db = Database::open(config).unwrap();
        let mut d = Document::new();
        d.set("name", Value::Str("anon".into()));
        let id = db.insert(d).unwrap();
        assert!(db.get(&id).is_some());
    }

    #[test]
    fn delete_removes_document_and_index_entry() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.storage_path = dir.path().to_path_buf();
        let db = Database::open(config).unwrap();
        db.register_index(SecondaryIndex::new("age_idx", vec!["age".into()], false));
        db.insert(doc("doc1", &[("age", Value::I64(30))])).unwrap();
        db.delete("doc1").unwrap();
        assert!(db.get("doc1").is_none());
    }

    #[test]
    fn flush_moves_documents_into_an_sstable() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.storage_path = dir.path().to_path_buf();
        config.memtable_flush_threshold = 1_000_000;
        let db = Database::open(config).unwrap();
        db.insert(doc("doc1", &[("age", Value::I64(1))])).unwrap();
        db.flush().unwrap();
        assert_eq!(db.sstables.read().len(), 1);
    }

    #[test]
    fn search_text_finds_indexed_document() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.storage_path = dir.path().to_path_buf();
        let db = Database::open(config).unwrap();
        db.register_text_field("body");
        db.insert(doc("doc1", &[("body", Value::Str("databases are fast".into()))])).unwrap();
        let results = db.search_text("databases");
        assert_eq!(results.first().map(|(id, _)| id.as_str()), Some("doc1"));
    }
}
