//! LRU Tracker Module
//!
//! Implements Least Recently Used tracking for disk entry eviction.

use std::collections::{BTreeMap, HashMap};

// == LRU Tracker ==
/// Access order of committed entries.
///
/// Every touch stamps the key with a fresh tick. `order` maps tick to key, so
/// the first element is always the least recently used.
#[derive(Debug, Default)]
pub struct LruTracker {
    /// Last access tick per key
    ticks: HashMap<String, u64>,
    /// Keys ordered by access tick, oldest first
    order: BTreeMap<u64, String>,
    /// Next tick to hand out
    clock: u64,
}

impl LruTracker {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Marks a key as most recently used, inserting it if new.
    pub fn touch(&mut self, key: &str) {
        let tick = self.clock;
        self.clock += 1;

        match self.ticks.get_mut(key) {
            Some(previous) => {
                if let Some(owned) = self.order.remove(&*previous) {
                    self.order.insert(tick, owned);
                }
                *previous = tick;
            }
            None => {
                self.ticks.insert(key.to_string(), tick);
                self.order.insert(tick, key.to_string());
            }
        }
    }

    // == Remove ==
    /// Forgets a key. Unknown keys are ignored.
    pub fn remove(&mut self, key: &str) {
        if let Some(tick) = self.ticks.remove(key) {
            self.order.remove(&tick);
        }
    }

    /// Iterates keys from least to most recently used.
    pub fn oldest_first(&self) -> impl Iterator<Item = &str> {
        self.order.values().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn clear(&mut self) {
        self.ticks.clear();
        self.order.clear();
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_with(keys: &[&str]) -> LruTracker {
        let mut lru = LruTracker::new();
        for key in keys {
            lru.touch(key);
        }
        lru
    }

    fn order(lru: &LruTracker) -> Vec<&str> {
        lru.oldest_first().collect()
    }

    #[test]
    fn test_empty_tracker() {
        let lru = LruTracker::new();
        assert!(lru.is_empty());
        assert_eq!(lru.oldest_first().next(), None);
    }

    #[test]
    fn test_insertion_order_is_eviction_order() {
        let lru = tracker_with(&["feed_hot", "feed_new", "profile_7"]);

        assert_eq!(lru.len(), 3);
        assert_eq!(order(&lru), vec!["feed_hot", "feed_new", "profile_7"]);
    }

    #[test]
    fn test_read_moves_entry_to_back() {
        // Replaying CLEAN a, CLEAN b, READ a leaves b as the eviction candidate
        let mut lru = tracker_with(&["a", "b"]);
        lru.touch("a");

        assert_eq!(lru.len(), 2);
        assert_eq!(order(&lru), vec!["b", "a"]);
    }

    #[test]
    fn test_repeated_touches_keep_single_slot() {
        let lru = tracker_with(&["x", "x", "y", "x"]);

        assert_eq!(lru.len(), 2);
        assert_eq!(order(&lru), vec!["y", "x"]);
    }

    #[test]
    fn test_remove_skips_unknown_keys() {
        let mut lru = tracker_with(&["one", "two", "three"]);

        lru.remove("two");
        lru.remove("never_cached");

        assert_eq!(lru.len(), 2);
        assert_eq!(order(&lru), vec!["one", "three"]);
    }

    #[test]
    fn test_oldest_first_can_skip_busy_keys() {
        // The store skips entries with an open edit when trimming
        let lru = tracker_with(&["busy", "idle_1", "idle_2"]);

        let victim = lru.oldest_first().find(|key| *key != "busy");

        assert_eq!(victim, Some("idle_1"));
        assert_eq!(lru.len(), 3);
    }

    #[test]
    fn test_clear_forgets_everything() {
        let mut lru = tracker_with(&["a", "b"]);
        lru.clear();

        assert!(lru.is_empty());
        assert_eq!(lru.oldest_first().count(), 0);
        lru.touch("c");
        assert_eq!(order(&lru), vec!["c"]);
    }
}
