use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::value::{CompositeKey, Value};

/// A scalar or tuple key used by a secondary index.
#[derive(Debug, Clone)]
pub enum Key {
    Scalar(Value),
    Composite(CompositeKey),
}

impl Key {
    pub fn compare(&self, other: &Key) -> std::cmp::Ordering {
        match (self, other) {
            (Key::Scalar(a), Key::Scalar(b)) => a.compare(b),
            (Key::Composite(a), Key::Composite(b)) => a.compare(b),
            (Key::Scalar(a), Key::Composite(b)) => CompositeKey::new(vec![a.clone()]).compare(b),
            (Key::Composite(a), Key::Scalar(b)) => a.compare(&CompositeKey::new(vec![b.clone()])),
        }
    }

    /// A byte-ordered sort key so the index can be backed by a `BTreeMap`.
    fn sort_key(&self) -> Vec<u8> {
        fn encode_value(v: &Value, out: &mut Vec<u8>) {
            match v {
                Value::Null => out.push(0),
                Value::Bool(b) => {
                    out.push(1);
                    out.push(*b as u8);
                }
                Value::I64(i) => {
                    out.push(2);
                    out.extend_from_slice(&(*i as f64).to_be_bytes());
                }
                Value::F64(f) => {
                    out.push(2);
                    out.extend_from_slice(&f.to_be_bytes());
                }
                Value::Str(s) => {
                    out.push(3);
                    out.extend_from_slice(s.as_bytes());
                    out.push(0);
                }
                Value::Bytes(b) => {
                    out.push(4);
                    out.extend_from_slice(b);
                }
                Value::Timestamp(t) => {
                    out.push(5);
                    out.extend_from_slice(&t.timestamp_millis().to_be_bytes());
                }
                Value::ObjectId(o) => {
                    out.push(6);
                    out.extend_from_slice(&o.0);
                }
                Value::List(l) => {
                    out.push(7);
                    for item in l {
                        encode_value(item, out);
                    }
                }
                Value::Map(_) => out.push(8),
            }
        }
        let mut out = Vec::new();
        match self {
            Key::Scalar(v) => encode_value(v, &mut out),
            Key::Composite(c) => {
                for v in &c.0 {
                    encode_value(v, &mut out);
                    out.push(0xff);
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct IndexStatistics {
    pub total_entries: usize,
    pub unique_keys: usize,
    pub last_analyzed_at: Option<i64>,
    pub is_stale: bool,
}

struct Entries {
    /// Sort-key bytes -> (original Key, insertion-ordered docIds).
    by_key: BTreeMap<Vec<u8>, (Key, Vec<String>)>,
}

/// Maps a Key (scalar Value or CompositeKey) to docId(s). Unique indexes
/// forbid two docs sharing the same key; non-unique indexes accumulate an
/// insertion-ordered list per key.
pub struct SecondaryIndex {
    name: String,
    field_paths: Vec<String>,
    unique: bool,
    entries: RwLock<Entries>,
    stats: RwLock<IndexStatistics>,
    dirty: AtomicBool,
}

impl SecondaryIndex {
    pub fn new(name: impl Into<String>, field_paths: Vec<String>, unique: bool) -> Self {
        SecondaryIndex {
            name: name.into(),
            field_paths,
            unique,
            entries: RwLock::new(Entries { by_key: BTreeMap::new() }),
            stats: RwLock::new(IndexStatistics::default()),
            dirty: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_compound(&self) -> bool {
        self.field_paths.len() > 1
    }

    pub fn field_path(&self) -> &str {
        &self.field_paths[0]
    }

    pub fn field_paths(&self) -> &[String] {
        &self.field_paths
    }

    pub fn insert(&self, key: Key, doc_id: String) -> Result<()> {
        let sk = key.sort_key();
        let mut entries = self.entries.write();
        match entries.by_key.get_mut(&sk) {
            Some((_, ids)) => {
                if self.unique && !ids.is_empty() {
                    return Err(Error::new(
                        ErrorKind::DuplicateKey,
                        format!("unique index {} already has an entry for this key", self.name),
                    ));
                }
                if self.unique {
                    ids.clear();
                }
                ids.push(doc_id);
            }
            None => {
                entries.by_key.insert(sk, (key, vec![doc_id]));
            }
        }
        self.dirty.store(true, Ordering::Relaxed);
        Ok(())
    }

    pub fn delete(&self, key: &Key) {
        let sk = key.sort_key();
        self.entries.write().by_key.remove(&sk);
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Removes a single docId association for a key (non-unique indexes can
    /// hold several docs per key).
    pub fn delete_doc(&self, key: &Key, doc_id: &str) {
        let sk = key.sort_key();
        let mut entries = self.entries.write();
        if let Some((_, ids)) = entries.by_key.get_mut(&sk) {
            ids.retain(|id| id != doc_id);
            if ids.is_empty() {
                entries.by_key.remove(&sk);
            }
        }
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Single-match search — the first associated docId, matching the
    /// spec's `search(key) -> docId?` contract.
    pub fn search(&self, key: &Key) -> Option<String> {
        let sk = key.sort_key();
        self.entries.read().by_key.get(&sk).and_then(|(_, ids)| ids.first().cloned())
    }

    pub fn search_all(&self, key: &Key) -> Vec<String> {
        let sk = key.sort_key();
        self.entries.read().by_key.get(&sk).map(|(_, ids)| ids.clone()).unwrap_or_default()
    }

    /// Both bounds inclusive; either may be absent for an unbounded side.
    /// Ties break by key comparison, then insertion order within equal keys.
    pub fn range_scan(&self, start: Option<&Key>, end: Option<&Key>) -> (Vec<Key>, Vec<String>) {
        let entries = self.entries.read();
        let start_sk = start.map(|k| k.sort_key());
        let end_sk = end.map(|k| k.sort_key());

        let mut keys = Vec::new();
        let mut doc_ids = Vec::new();
        for (sk, (key, ids)) in entries.by_key.iter() {
            if let Some(s) = &start_sk {
                if sk < s {
                    continue;
                }
            }
            if let Some(e) = &end_sk {
                if sk > e {
                    continue;
                }
            }
            for id in ids {
                keys.push(clone_key(key));
                doc_ids.push(id.clone());
            }
        }
        (keys, doc_ids)
    }

    pub fn analyze(&self, now: i64) {
        let entries = self.entries.read();
        let total_entries: usize = entries.by_key.values().map(|(_, ids)| ids.len()).sum();
        let unique_keys = entries.by_key.len();
        drop(entries);
        let mut stats = self.stats.write();
        stats.total_entries = total_entries;
        stats.unique_keys = unique_keys;
        stats.last_analyzed_at = Some(now);
        stats.is_stale = false;
        self.dirty.store(false, Ordering::Relaxed);
    }

    pub fn get_statistics(&self) -> IndexStatistics {
        let mut stats = self.stats.read().clone();
        stats.is_stale = self.dirty.load(Ordering::Relaxed);
        stats
    }
}

fn clone_key(k: &Key) -> Key {
    match k {
        Key::Scalar(v) => Key::Scalar(v.clone()),
        Key::Composite(c) => Key::Composite(CompositeKey::new(c.0.clone())),
    }
}
