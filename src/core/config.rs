use std::path::PathBuf;
use std::time::Duration;

/// Kernel-wide tunables. Per-table/per-index constructors accept their own
/// overrides (e.g. SSTable sparse-index interval); this struct only supplies
/// the defaults a `Database` wires through when none are given explicitly.
#[derive(Debug, Clone)]
pub struct Config {
    pub storage_path: PathBuf,

    /// Number of MemTable entries that triggers a flush to a new SSTable.
    pub memtable_flush_threshold: usize,

    /// Every Nth SSTable entry gets a sparse-index entry.
    pub sstable_index_interval: usize,

    /// Bloom filter bits-per-key (m ≈ bits_per_key · n).
    pub bloom_bits_per_key: usize,
    pub bloom_num_hashes: usize,

    pub lru_capacity: usize,
    pub lru_shard_count: usize,
    pub lru_ttl: Duration,

    pub parallel_min_docs: usize,
    pub parallel_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_path: PathBuf::from("./data"),
            memtable_flush_threshold: 1000,
            sstable_index_interval: 10,
            bloom_bits_per_key: 10,
            bloom_num_hashes: 7,
            lru_capacity: 10_000,
            lru_shard_count: 16,
            lru_ttl: Duration::from_secs(300),
            parallel_min_docs: 1000,
            parallel_workers: num_cpus::get(),
        }
    }
}
