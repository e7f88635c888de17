pub mod analysis;
pub mod concurrent;
pub mod core;
pub mod index;
pub mod query;
pub mod search;
pub mod storage;

pub use crate::core::database::Database;
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::value::{Document, Value};

/*
┌────────────────────────────────────────────────────────────────────────────┐
│                          LAURA-DB KERNEL LAYOUT                            │
└────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────── CORE ───────────────────────────────────┐
│ struct Database                // composition root, ties every layer       │
│ • config: Config                                                           │
│ • storage: Arc<StorageLayout>                                              │
│ • memtable: RwLock<MemTable>                                               │
│ • sstables: RwLock<Vec<SSTableReader>>                                     │
│ • indexes: RwLock<HashMap<String, Arc<SecondaryIndex>>>                    │
│ • inverted: RwLock<InvertedIndex>                                          │
│ • cache: ShardedLru                                                        │
│                                                                              │
│ enum Value / struct Document / struct OrderedMap / struct CompositeKey     │
│ struct Error { kind: ErrorKind, context: String }                          │
└──────────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────────── STORAGE ─────────────────────────────────┐
│ SkipListMap (MemTable ordering)  ──flush──> SSTableWriter/Reader            │
│ Wal (durability)                  BloomFilter (negative-lookup pruning)    │
│ StorageLayout (on-disk directories)  FileLock (single-writer guard)        │
└──────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────── INDEX ──────────────────────────────────┐
│ SecondaryIndex { field_paths, unique, entries: BTreeMap<Key, [DocId]> }     │
└──────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────── QUERY ──────────────────────────────────┐
│ Filter AST ──QueryPlanner (cost-based)──> Plan ──QueryExecutor──> Cursor    │
└──────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────────── ANALYSIS ─────────────────────────────────┐
│ Tokenizer ──StopWordFilter──> PorterStemmer ──> Analyzer pipeline           │
└──────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────── SEARCH ─────────────────────────────────┐
│ InvertedIndex { postings: HashMap<Term, PostingList> } ──BM25Scorer──> hits │
└──────────────────────────────────────────────────────────────────────────────┘

┌───────────────────────────────── CONCURRENT ────────────────────────────────┐
│ TreiberStack (crossbeam::epoch)  AtomicCounter  ShardedLru (FNV-sharded)    │
└──────────────────────────────────────────────────────────────────────────────┘
*/
