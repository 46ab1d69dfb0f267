//! Extendible hashing.
//!
//! Associative container used by the buffer pool as its page table. The
//! directory doubles as buckets fill; each bucket splits independently at
//! its own local depth, so growth never invalidates entries that did not
//! move.

use parking_lot::Mutex;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};

/// A single bucket of key-value pairs.
///
/// Buckets are arena-allocated in the table; directory slots store bucket
/// indices, and several slots whose low `local_depth` hash bits agree share
/// one bucket.
#[derive(Debug)]
struct Bucket<K, V> {
    /// Hash-prefix width this bucket is responsible for.
    local_depth: usize,
    /// Entries with unique keys, at most `bucket_size` of them.
    items: Vec<(K, V)>,
}

impl<K: Eq, V> Bucket<K, V> {
    fn new(local_depth: usize, bucket_size: usize) -> Self {
        Self {
            local_depth,
            items: Vec::with_capacity(bucket_size),
        }
    }

    fn find(&self, key: &K) -> Option<&V> {
        self.items.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    fn remove(&mut self, key: &K) -> bool {
        match self.items.iter().position(|(k, _)| k == key) {
            Some(index) => {
                self.items.remove(index);
                true
            }
            None => false,
        }
    }

    /// Inserts or updates; returns false if the bucket is full and the key
    /// is not already present.
    fn insert(&mut self, key: K, value: V, bucket_size: usize) -> bool {
        if let Some((_, v)) = self.items.iter_mut().find(|(k, _)| *k == key) {
            *v = value;
            return true;
        }
        if self.items.len() >= bucket_size {
            return false;
        }
        self.items.push((key, value));
        true
    }
}

struct TableInner<K, V> {
    /// Directory of bucket indices; length is always `2^global_depth`.
    dir: Vec<usize>,
    /// Bucket arena. Splits reuse the old slot for the low half and push
    /// the high half, so no index ever dangles.
    buckets: Vec<Bucket<K, V>>,
    /// Hash-prefix width of the directory.
    global_depth: usize,
}

/// Extendible hash table mapping keys to values.
///
/// Insertion of an existing key updates its value. A single mutex
/// serializes all operations; bucket accesses happen only under it.
pub struct ExtendibleHashTable<K, V, S = RandomState> {
    inner: Mutex<TableInner<K, V>>,
    /// Maximum number of entries per bucket.
    bucket_size: usize,
    hasher: S,
}

impl<K, V> ExtendibleHashTable<K, V, RandomState>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Creates a table with the given bucket capacity and the default
    /// hasher.
    pub fn new(bucket_size: usize) -> Self {
        Self::with_hasher(bucket_size, RandomState::new())
    }
}

impl<K, V, S> ExtendibleHashTable<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher,
{
    /// Creates a table with the given bucket capacity and hasher.
    pub fn with_hasher(bucket_size: usize, hasher: S) -> Self {
        assert!(bucket_size > 0, "bucket size must be positive");
        Self {
            inner: Mutex::new(TableInner {
                dir: vec![0],
                buckets: vec![Bucket::new(0, bucket_size)],
                global_depth: 0,
            }),
            bucket_size,
            hasher,
        }
    }

    fn hash_of(&self, key: &K) -> u64 {
        self.hasher.hash_one(key)
    }

    fn index_of(hash: u64, global_depth: usize) -> usize {
        (hash & ((1u64 << global_depth) - 1)) as usize
    }

    /// Looks up the value for a key.
    pub fn find(&self, key: &K) -> Option<V> {
        let hash = self.hash_of(key);
        let inner = self.inner.lock();
        let slot = Self::index_of(hash, inner.global_depth);
        inner.buckets[inner.dir[slot]].find(key).cloned()
    }

    /// Returns true if the key is present.
    pub fn contains(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    /// Removes a key. Returns true if it was present.
    pub fn remove(&self, key: &K) -> bool {
        let hash = self.hash_of(key);
        let mut inner = self.inner.lock();
        let slot = Self::index_of(hash, inner.global_depth);
        let bucket = inner.dir[slot];
        inner.buckets[bucket].remove(key)
    }

    /// Inserts a key-value pair, updating the value if the key exists.
    ///
    /// A full bucket splits: if its local depth has reached the global
    /// depth the directory doubles first, then the bucket's entries are
    /// redistributed over one more hash bit and the insert retries. Each
    /// round either succeeds or strictly deepens a bucket, so the loop
    /// terminates for any finite set of hash collisions.
    pub fn insert(&self, key: K, value: V) {
        let hash = self.hash_of(&key);
        let mut inner = self.inner.lock();

        loop {
            let slot = Self::index_of(hash, inner.global_depth);
            let bucket_index = inner.dir[slot];

            if inner.buckets[bucket_index].insert(key.clone(), value.clone(), self.bucket_size) {
                return;
            }

            if inner.buckets[bucket_index].local_depth == inner.global_depth {
                // Double the directory: the new upper half mirrors the
                // lower half, keeping every bucket reachable.
                let len = inner.dir.len();
                for i in 0..len {
                    let b = inner.dir[i];
                    inner.dir.push(b);
                }
                inner.global_depth += 1;
            }

            // Split: the old slot keeps the entries whose new bit is 0,
            // a fresh bucket takes the rest.
            inner.buckets[bucket_index].local_depth += 1;
            let local_depth = inner.buckets[bucket_index].local_depth;
            let entries = std::mem::take(&mut inner.buckets[bucket_index].items);

            let high_index = inner.buckets.len();
            inner
                .buckets
                .push(Bucket::new(local_depth, self.bucket_size));

            for (k, v) in entries {
                let target = if (self.hash_of(&k) >> (local_depth - 1)) & 1 == 1 {
                    high_index
                } else {
                    bucket_index
                };
                inner.buckets[target].items.push((k, v));
            }

            for i in 0..inner.dir.len() {
                if inner.dir[i] == bucket_index && (i >> (local_depth - 1)) & 1 == 1 {
                    inner.dir[i] = high_index;
                }
            }
        }
    }

    /// Returns the directory-wide hash-prefix width.
    pub fn global_depth(&self) -> usize {
        self.inner.lock().global_depth
    }

    /// Returns the hash-prefix width of the bucket behind a directory slot.
    pub fn local_depth(&self, dir_index: usize) -> usize {
        let inner = self.inner.lock();
        inner.buckets[inner.dir[dir_index]].local_depth
    }

    /// Returns the number of directory slots.
    pub fn dir_len(&self) -> usize {
        self.inner.lock().dir.len()
    }

    /// Returns the number of distinct buckets.
    pub fn num_buckets(&self) -> usize {
        self.inner.lock().buckets.len()
    }

    /// Returns the number of stored entries.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .buckets
            .iter()
            .map(|b| b.items.len())
            .sum()
    }

    /// Returns true if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
