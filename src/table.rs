// Copyright (c) 2025 RustyPS Contributors
//
// Sharded sparse table
//
// The server-side key -> parameter store, partitioned into a fixed number of
// lock-striped shards. A batch touching keys spread across shards holds at
// most one lock per shard at a time, so reads and writes scale up to
// shard-way concurrency. There are no cross-shard transactions.

use std::collections::HashMap;

use crossbeam::utils::CachePadded;
use parking_lot::RwLock;

use crate::router::shard_hash;

/// One partition of the table. Owns its reader/writer lock; padded to a
/// cache line so neighbouring shards do not share one under write
/// contention.
struct TableShard<V> {
    data: RwLock<HashMap<u64, V>>,
}

impl<V: Clone> TableShard<V> {
    fn new() -> TableShard<V> {
        TableShard {
            data: RwLock::new(HashMap::new()),
        }
    }

    fn find(&self, key: u64) -> Option<V> {
        self.data.read().get(&key).cloned()
    }

    fn assign(&self, key: u64, value: V) {
        self.data.write().insert(key, value);
    }

    /// Probe and lazy-insert under a single write-lock acquisition, keeping
    /// insertion atomic relative to concurrent readers: `init` runs at most
    /// once per key.
    fn get_or_insert_with(&self, key: u64, init: impl FnOnce() -> V) -> V {
        if let Some(value) = self.find(key) {
            return value;
        }
        self.data.write().entry(key).or_insert_with(init).clone()
    }

    /// In-place mutation; `false` when the key is absent.
    fn update(&self, key: u64, f: impl FnOnce(&mut V)) -> bool {
        match self.data.write().get_mut(&key) {
            Some(value) => {
                f(value);
                true
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.data.read().len()
    }
}

/// Key -> value store over `S` fixed shards. The shard holding a key is
/// uniquely `shard_hash(key) mod S` for the life of the process.
pub struct SparseTable<V> {
    shards: Box<[CachePadded<TableShard<V>>]>,
}

impl<V: Clone> SparseTable<V> {
    pub fn new(shard_num: usize) -> SparseTable<V> {
        assert!(shard_num > 0, "table needs at least one shard");
        let shards = (0..shard_num)
            .map(|_| CachePadded::new(TableShard::new()))
            .collect();
        SparseTable { shards }
    }

    pub fn shard_num(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    pub fn shard_of(&self, key: u64) -> usize {
        (shard_hash(key) % self.shards.len() as u64) as usize
    }

    pub fn find(&self, key: u64) -> Option<V> {
        self.shards[self.shard_of(key)].find(key)
    }

    pub fn assign(&self, key: u64, value: V) {
        self.shards[self.shard_of(key)].assign(key, value);
    }

    pub fn get_or_insert_with(&self, key: u64, init: impl FnOnce() -> V) -> V {
        self.shards[self.shard_of(key)].get_or_insert_with(key, init)
    }

    pub fn update(&self, key: u64, f: impl FnOnce(&mut V)) -> bool {
        self.shards[self.shard_of(key)].update(key, f)
    }

    /// Total number of stored keys, summed across shards.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.len() == 0)
    }
}
