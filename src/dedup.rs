//! Fixed-capacity duplicate-alert table.
//!
//! A ring of slots holds keys in insertion order and a map points each key
//! at its slot. When the ring is full the oldest slot is overwritten (FIFO by
//! local detection order, not by the alert's own timestamp).

use std::collections::HashMap;

use crate::contracts::DedupKey;
use crate::DEDUP_TABLE_SIZE;

/// Recently seen `(origin_mac, timestamp)` keys
#[derive(Debug, Clone)]
pub struct DedupTable {
    slots: Vec<Option<DedupKey>>,
    index: HashMap<DedupKey, usize>,
    /// Slot the next insertion lands in (the oldest when full)
    next: usize,
}

impl DedupTable {
    pub fn new() -> Self {
        Self::with_capacity(DEDUP_TABLE_SIZE)
    }

    /// Table holding at most `capacity` keys (minimum 1)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: vec![None; capacity],
            index: HashMap::with_capacity(capacity),
            next: 0,
        }
    }

    pub fn contains(&self, key: &DedupKey) -> bool {
        self.index.contains_key(key)
    }

    /// Insert a key, returning the entry evicted to make room.
    ///
    /// Inserting a key that is already present is a no-op.
    pub fn insert(&mut self, key: DedupKey) -> Option<DedupKey> {
        if self.contains(&key) {
            return None;
        }
        let slot = self.next;
        let evicted = self.slots[slot].replace(key);
        if let Some(old) = evicted {
            self.index.remove(&old);
        }
        self.index.insert(key, slot);
        self.next = (slot + 1) % self.slots.len();
        evicted
    }

    /// Insert and return `true` if the key was new (not a duplicate)
    pub fn check_and_insert(&mut self, key: DedupKey) -> bool {
        if self.contains(&key) {
            return false;
        }
        self.insert(key);
        true
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Keys from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &DedupKey> + '_ {
        let (newer, older) = self.slots.split_at(self.next);
        older.iter().chain(newer.iter()).flatten()
    }
}

impl Default for DedupTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::MacAddress;

    fn key(seed: u8) -> DedupKey {
        DedupKey::new(MacAddress::new([seed, 0, 0, 0, 0, seed]), 1000 + seed as u32)
    }

    #[test]
    fn test_new_table_is_empty() {
        let table = DedupTable::new();
        assert!(table.is_empty());
        assert_eq!(table.capacity(), DEDUP_TABLE_SIZE);
    }

    #[test]
    fn test_insert_duplicate_returns_false() {
        let mut table = DedupTable::new();
        assert!(table.check_and_insert(key(1)));
        assert!(!table.check_and_insert(key(1)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_same_mac_different_timestamp_is_distinct() {
        let mut table = DedupTable::new();
        let mac = MacAddress::new([3; 6]);
        assert!(table.check_and_insert(DedupKey::new(mac, 10)));
        assert!(table.check_and_insert(DedupKey::new(mac, 11)));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_fifo_eviction_at_capacity() {
        let mut table = DedupTable::new();
        for seed in 1..=16 {
            assert_eq!(table.insert(key(seed)), None);
        }
        assert_eq!(table.len(), 16);

        // k17 pushes out k1
        assert_eq!(table.insert(key(17)), Some(key(1)));
        assert!(!table.contains(&key(1)));
        for seed in 2..=17 {
            assert!(table.contains(&key(seed)), "k{} should remain", seed);
        }

        // k1 is new again and evicts k2
        assert!(table.check_and_insert(key(1)));
        assert!(!table.contains(&key(2)));
        assert_eq!(table.len(), 16);
    }

    #[test]
    fn test_reinsert_does_not_refresh_position() {
        let mut table = DedupTable::with_capacity(2);
        table.insert(key(1));
        table.insert(key(2));
        table.insert(key(1));
        assert_eq!(table.insert(key(3)), Some(key(1)));
    }

    #[test]
    fn test_iter_oldest_first() {
        let mut table = DedupTable::with_capacity(3);
        for seed in 1..=5 {
            table.insert(key(seed));
        }
        let order: Vec<_> = table.iter().copied().collect();
        assert_eq!(order, vec![key(3), key(4), key(5)]);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut table = DedupTable::with_capacity(0);
        assert_eq!(table.capacity(), 1);
        table.insert(key(1));
        assert_eq!(table.insert(key(2)), Some(key(1)));
    }
}
