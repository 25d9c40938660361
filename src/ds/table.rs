//! Closed-addressing hash index over pool nodes.
//!
//! Maps `(hash, key)` to a node via a power-of-two bucket array; each bucket
//! is a singly-linked chain threaded through the nodes' `hash_next` link.
//! The table is sized once to its cache's capacity and never rehashes, so
//! expected chain length stays at one for a well-distributed hash.

use crate::ds::node::{NodePool, NodeRef};

/// Hash index keyed by `(hash, key)`.
///
/// The table stores no keys of its own; matching walks the chain and
/// compares the `hash` and `key` fields stored in the nodes.
#[derive(Debug)]
pub struct NodeTable {
    buckets: Vec<NodeRef>,
    mask: u32,
}

impl NodeTable {
    /// Builds a table with `next_power_of_two(size)` empty buckets.
    pub(crate) fn with_capacity_for(size: usize) -> Self {
        debug_assert!(size > 0);
        let len = size.next_power_of_two();
        Self {
            buckets: vec![NodeRef::NONE; len],
            mask: u32::try_from(len - 1).expect("table too large for 32-bit hashing"),
        }
    }

    #[inline]
    fn bucket_of(&self, hash: u32) -> usize {
        (hash & self.mask) as usize
    }

    /// Prepends `e` to its bucket chain.
    ///
    /// The caller must ensure no entry with the same `(hash, key)` is
    /// currently in the table.
    pub(crate) fn insert<K: Copy + Eq, V>(&mut self, pool: &mut NodePool<K, V>, e: NodeRef) {
        let (key, hash) = {
            let node = pool.get(e);
            (node.key, node.hash)
        };
        debug_assert!(
            self.lookup(pool, key, hash).is_none(),
            "duplicate (hash, key) insertion"
        );
        let bucket = self.bucket_of(hash);
        pool.get_mut(e).hash_next = self.buckets[bucket];
        self.buckets[bucket] = e;
    }

    /// Finds the node matching `(hash, key)`, if present.
    pub(crate) fn lookup<K: Copy + Eq, V>(
        &self,
        pool: &NodePool<K, V>,
        key: K,
        hash: u32,
    ) -> Option<NodeRef> {
        let mut cur = self.buckets[self.bucket_of(hash)];
        while cur != NodeRef::NONE {
            let node = pool.get(cur);
            if node.hash == hash && node.key == key {
                return Some(cur);
            }
            cur = node.hash_next;
        }
        None
    }

    /// Splices out and returns the node matching `(hash, key)`, if present.
    pub(crate) fn remove<K: Copy + Eq, V>(
        &mut self,
        pool: &mut NodePool<K, V>,
        key: K,
        hash: u32,
    ) -> Option<NodeRef> {
        let bucket = self.bucket_of(hash);
        let mut prev = NodeRef::NONE;
        let mut cur = self.buckets[bucket];
        while cur != NodeRef::NONE {
            let node = pool.get(cur);
            if node.hash == hash && node.key == key {
                let next = node.hash_next;
                if prev == NodeRef::NONE {
                    self.buckets[bucket] = next;
                } else {
                    pool.get_mut(prev).hash_next = next;
                }
                return Some(cur);
            }
            prev = cur;
            cur = node.hash_next;
        }
        None
    }

    /// Number of buckets. Always a power of two.
    pub(crate) fn num_buckets(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ds::node::NodePool;

    fn node(pool: &mut NodePool<u32, u32>, key: u32, hash: u32) -> NodeRef {
        let r = pool.alloc_detached();
        pool.get_mut(r).rekey(key, hash);
        r
    }

    #[test]
    fn bucket_count_rounds_up_to_power_of_two() {
        assert_eq!(NodeTable::with_capacity_for(5).num_buckets(), 8);
        assert_eq!(NodeTable::with_capacity_for(8).num_buckets(), 8);
        assert_eq!(NodeTable::with_capacity_for(9).num_buckets(), 16);
    }

    #[test]
    fn insert_lookup_remove_roundtrip() {
        let mut pool: NodePool<u32, u32> = NodePool::with_capacity(4);
        let mut table = NodeTable::with_capacity_for(4);
        let a = node(&mut pool, 1, 0x11);
        let b = node(&mut pool, 2, 0x22);
        table.insert(&mut pool, a);
        table.insert(&mut pool, b);

        assert_eq!(table.lookup(&pool, 1, 0x11), Some(a));
        assert_eq!(table.lookup(&pool, 2, 0x22), Some(b));
        assert_eq!(table.lookup(&pool, 3, 0x33), None);

        assert_eq!(table.remove(&mut pool, 1, 0x11), Some(a));
        assert_eq!(table.lookup(&pool, 1, 0x11), None);
        assert_eq!(table.remove(&mut pool, 1, 0x11), None);
        assert_eq!(table.lookup(&pool, 2, 0x22), Some(b));
    }

    #[test]
    fn colliding_hashes_chain_in_one_bucket() {
        let mut pool: NodePool<u32, u32> = NodePool::with_capacity(4);
        let mut table = NodeTable::with_capacity_for(4);
        // Same bucket (hash & mask equal), distinct keys.
        let a = node(&mut pool, 10, 0x10);
        let b = node(&mut pool, 20, 0x10);
        let c = node(&mut pool, 30, 0x10);
        table.insert(&mut pool, a);
        table.insert(&mut pool, b);
        table.insert(&mut pool, c);

        assert_eq!(table.lookup(&pool, 10, 0x10), Some(a));
        assert_eq!(table.lookup(&pool, 20, 0x10), Some(b));
        assert_eq!(table.lookup(&pool, 30, 0x10), Some(c));

        // Remove the middle of the chain and re-check both neighbours.
        assert_eq!(table.remove(&mut pool, 20, 0x10), Some(b));
        assert_eq!(table.lookup(&pool, 10, 0x10), Some(a));
        assert_eq!(table.lookup(&pool, 30, 0x10), Some(c));
    }

    #[test]
    fn equal_hash_different_key_is_not_a_match() {
        let mut pool: NodePool<u32, u32> = NodePool::with_capacity(2);
        let mut table = NodeTable::with_capacity_for(2);
        let a = node(&mut pool, 7, 0xdead);
        table.insert(&mut pool, a);
        assert_eq!(table.lookup(&pool, 8, 0xdead), None);
    }
}
