//! Block timestamp cache
//!
//! In-memory cache to avoid repeated `eth_getBlockByNumber` calls when
//! enriching logs and traces with timestamps. Confirmed blocks are
//! immutable, so entries never expire; the cache is bounded and evicts
//! the oldest block numbers when full, which matches how ingestion walks
//! ranges forward.

use std::collections::{BTreeMap, HashMap};

const DEFAULT_CAPACITY: usize = 10_000;

/// Maps block number to its timestamp in epoch milliseconds.
pub struct BlockTimeCache {
    cache: HashMap<u64, u64>,
    /// Insertion order by block number; evicts the lowest first.
    order: BTreeMap<u64, ()>,
    capacity: usize,
}

impl BlockTimeCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cache: HashMap::new(),
            order: BTreeMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Cached timestamp (epoch millis) for `block`, if known.
    pub fn get(&self, block: u64) -> Option<u64> {
        self.cache.get(&block).copied()
    }

    /// Record the timestamp of a confirmed block.
    pub fn put(&mut self, block: u64, ts_millis: u64) {
        if self.cache.insert(block, ts_millis).is_none() {
            self.order.insert(block, ());
            if self.order.len() > self.capacity {
                if let Some((&oldest, _)) = self.order.iter().next() {
                    self.order.remove(&oldest);
                    self.cache.remove(&oldest);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Default for BlockTimeCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_operations() {
        let mut cache = BlockTimeCache::new();
        assert_eq!(cache.get(100), None);

        cache.put(100, 1_700_000_000_000);
        assert_eq!(cache.get(100), Some(1_700_000_000_000));

        // Overwriting does not grow the cache.
        cache.put(100, 1_700_000_000_000);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evicts_oldest_block_first() {
        let mut cache = BlockTimeCache::with_capacity(2);
        cache.put(10, 1);
        cache.put(20, 2);
        cache.put(30, 3);
        assert_eq!(cache.get(10), None);
        assert_eq!(cache.get(20), Some(2));
        assert_eq!(cache.get(30), Some(3));
        assert_eq!(cache.len(), 2);
    }
}
