use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

const FNV_OFFSET: u32 = 2166136261;
const FNV_PRIME: u32 = 16777619;

fn fnv32(key: &str) -> u32 {
    let mut hash = FNV_OFFSET;
    for byte in key.as_bytes() {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn next_power_of_two(n: usize) -> usize {
    n.max(1).next_power_of_two()
}

struct Shard<V> {
    cache: Mutex<LruCache<String, (V, Instant)>>,
}

/// FNV-hash-sharded LRU cache with per-entry TTL. Sharding spreads lock
/// contention; each shard is an independent LRU keyed by the low bits of
/// the FNV-32 hash of the cache key, masked against `shard_count - 1`
/// (shard_count is rounded up to a power of two so the mask is exact).
pub struct ShardedLru<V> {
    shards: Vec<Shard<V>>,
    mask: u32,
    ttl: Option<Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> ShardedLru<V> {
    pub fn new(capacity: usize, shard_count: usize, ttl: Option<Duration>) -> Self {
        let shard_count = next_power_of_two(shard_count);
        let per_shard = capacity.div_ceil(shard_count).max(1);
        let cap = NonZeroUsize::new(per_shard).unwrap();
        let shards = (0..shard_count).map(|_| Shard { cache: Mutex::new(LruCache::new(cap)) }).collect();
        ShardedLru {
            shards,
            mask: (shard_count - 1) as u32,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn shard_for(&self, key: &str) -> &Shard<V> {
        let idx = fnv32(key) & self.mask;
        &self.shards[idx as usize]
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let shard = self.shard_for(key);
        let mut cache = shard.cache.lock();
        if let Some((value, inserted_at)) = cache.get(key) {
            if let Some(ttl) = self.ttl {
                if inserted_at.elapsed() > ttl {
                    cache.pop(key);
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(value.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    pub fn put(&self, key: String, value: V) {
        let shard = self.shard_for(&key);
        let mut cache = shard.cache.lock();
        if cache.len() == cache.cap().get() && !cache.contains(&key) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        cache.put(key, (value, Instant::now()));
    }

    pub fn remove(&self, key: &str) {
        let shard = self.shard_for(key);
        shard.cache.lock().pop(key);
    }

    /// Empties every shard. Counters are left untouched — they describe
    /// lookup history, not current occupancy.
    pub fn clear(&self) {
        for shard in &self.shards {
            shard.cache.lock().clear();
        }
    }

    /// Total live entries across all shards.
    pub fn size(&self) -> usize {
        self.shards.iter().map(|shard| shard.cache.lock().len()).sum()
    }

    /// Sweeps every shard for TTL-expired entries without waiting for a
    /// lookup to trigger eviction. No-op when no TTL is configured. Returns
    /// the number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        let Some(ttl) = self.ttl else { return 0 };
        let mut removed = 0;
        for shard in &self.shards {
            let mut cache = shard.cache.lock();
            let expired: Vec<String> = cache
                .iter()
                .filter(|(_, (_, inserted_at))| inserted_at.elapsed() > ttl)
                .map(|(key, _)| key.clone())
                .collect();
            for key in expired {
                cache.pop(&key);
                removed += 1;
            }
        }
        removed
    }

    pub fn stats(&self) -> ShardedLruStats {
        ShardedLruStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ShardedLruStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl ShardedLruStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
