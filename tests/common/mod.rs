//! Shared helpers for the integration suites.

use std::collections::VecDeque;

/// Straightforward LRU simulator used as ground truth for the ghost caches.
pub struct RefLru {
    capacity: usize,
    order: VecDeque<u32>,
}

impl RefLru {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
        }
    }

    /// Simulates one access; returns `true` on a hit.
    pub fn access(&mut self, key: u32) -> bool {
        if let Some(pos) = self.order.iter().position(|&k| k == key) {
            self.order.remove(pos);
            self.order.push_back(key);
            return true;
        }
        if self.order.len() == self.capacity {
            self.order.pop_front();
        }
        self.order.push_back(key);
        false
    }
}

/// Simulates `keys` against an LRU of every size in `sizes`; returns the
/// per-size hit counts.
pub fn simulate_hit_counts(keys: &[u32], sizes: &[u32]) -> Vec<u64> {
    sizes
        .iter()
        .map(|&size| {
            let mut lru = RefLru::new(size as usize);
            keys.iter().filter(|&&k| lru.access(k)).count() as u64
        })
        .collect()
}
