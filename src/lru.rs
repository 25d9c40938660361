//! Fixed-capacity LRU engine over an arena of intrusive nodes.
//!
//! ## Architecture
//!
//! ```text
//!   ┌───────────────────────────────────────────────────────────────────┐
//!   │                         LruCache<K, V, H>                         │
//!   │                                                                   │
//!   │   NodePool<K, V>            NodeTable           LruCore           │
//!   │   ┌──────────────┐   ┌──────────────────┐   ┌────────────────┐    │
//!   │   │ node arena   │   │ (hash, key) →    │   │ free / lru /   │    │
//!   │   │ (stable u32  │◄──┤ node index,      │   │ in_use / erased│    │
//!   │   │  indices)    │   │ hash_next chains │   │ sentinels +    │    │
//!   │   └──────────────┘   └──────────────────┘   │ size, capacity │    │
//!   │                                             └────────────────┘    │
//!   └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every node lives in exactly one of four circular lists:
//!
//! | List     | Membership                   | `refs` |
//! |----------|------------------------------|--------|
//! | `free`   | allocatable slots            | 0      |
//! | `lru`    | resident, unpinned, ordered  | 1      |
//! | `in_use` | resident, pinned, unordered  | ≥ 2    |
//! | `erased` | removed from circulation     | 0      |
//!
//! The `lru` list is kept in strict least→most recently used order: the
//! sentinel's `next` is the eviction victim, its `prev` the freshest entry.
//! A node is present in the table iff it is on `lru` or `in_use`.
//!
//! ## Slot semantics
//!
//! Nodes are allocated once and recycled for the cache's whole lifetime. A
//! recycled node keeps its previous `value`: the slot models a stable
//! physical resource (a frame, a buffer) that is re-labelled with a new key,
//! not a key-owned datum. `erase`/`install` are the only operations that
//! move slots out of and into circulation, shrinking or growing `capacity`
//! by one; `preempt`/`assign` transfer a slot between two engines that share
//! one pool (see [`crate::shared`]).
//!
//! [`LruCore`] holds only the list state and operates over a borrowed pool
//! and table, which is what lets N tenant cores share one arena; the owning
//! [`LruCache`] bundles all three for the common single-tenant case.

use crate::ds::node::{Handle, NodePool, NodeRef};
use crate::ds::table::NodeTable;
use crate::hash::{GHash, KeyHash};
use std::fmt;

/// List state and bookkeeping of one LRU engine, independent of node
/// storage. All operations take the pool (and table) they act on.
pub(crate) struct LruCore {
    free: NodeRef,
    lru: NodeRef,
    in_use: NodeRef,
    erased: NodeRef,
    /// Nodes currently in the table (on `lru` or `in_use`).
    size: usize,
    /// Nodes in circulation (not on `erased`).
    capacity: usize,
}

impl LruCore {
    /// Allocates sentinels plus `capacity` pool nodes, all threaded onto the
    /// free list.
    pub(crate) fn init<K: Default, V: Default>(
        pool: &mut NodePool<K, V>,
        capacity: usize,
    ) -> Self {
        assert!(capacity > 0, "capacity must be nonzero");
        let core = LruCore {
            free: pool.new_list_head(),
            lru: pool.new_list_head(),
            in_use: pool.new_list_head(),
            erased: pool.new_list_head(),
            size: 0,
            capacity,
        };
        for _ in 0..capacity {
            let e = pool.alloc_detached();
            pool.list_append(core.free, e);
        }
        core
    }

    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub(crate) fn lru_head(&self) -> NodeRef {
        self.lru
    }

    /// Applies `f` to every value currently on the free list. Used by the
    /// owning cache's value initializer.
    pub(crate) fn for_each_free_value<K, V>(
        &self,
        pool: &mut NodePool<K, V>,
        mut f: impl FnMut(&mut V),
    ) {
        let mut cur = pool.next_of(self.free);
        while cur != self.free {
            let next = pool.next_of(cur);
            f(&mut pool.get_mut(cur).value);
            cur = next;
        }
    }

    // -- allocation --------------------------------------------------------

    /// Takes a slot from `free`, or evicts the coldest `lru` entry. Returns
    /// `None` when every slot is pinned.
    fn alloc_node<K: Copy + Eq, V>(
        &mut self,
        pool: &mut NodePool<K, V>,
        table: &mut NodeTable,
    ) -> Option<NodeRef> {
        if !pool.list_is_empty(self.free) {
            let e = pool.next_of(self.free);
            pool.list_remove(e);
            return Some(e);
        }
        if pool.list_is_empty(self.lru) {
            return None;
        }
        let e = pool.next_of(self.lru);
        debug_assert_eq!(pool.get(e).refs, 1);
        pool.list_remove(e);
        let (key, hash) = {
            let node = pool.get(e);
            (node.key, node.hash)
        };
        let removed = table.remove(pool, key, hash);
        debug_assert_eq!(removed, Some(e));
        self.size -= 1;
        Some(e)
    }

    fn free_node<K, V>(&mut self, pool: &mut NodePool<K, V>, e: NodeRef) {
        pool.get_mut(e).refs = 0;
        pool.list_append(self.free, e);
    }

    // -- refcount transitions ---------------------------------------------

    fn ref_node<K, V>(&mut self, pool: &mut NodePool<K, V>, e: NodeRef) {
        if pool.get(e).refs == 1 {
            pool.list_remove(e);
            pool.list_append(self.in_use, e);
        }
        pool.get_mut(e).refs += 1;
    }

    fn unref_node<K, V>(&mut self, pool: &mut NodePool<K, V>, e: NodeRef) {
        let refs = {
            let node = pool.get_mut(e);
            debug_assert!(node.refs > 0);
            node.refs -= 1;
            node.refs
        };
        if refs == 0 {
            pool.list_remove(e);
            pool.list_append(self.free, e);
        } else if refs == 1 {
            pool.list_remove(e);
            pool.list_append(self.lru, e);
        }
    }

    /// Moves an unpinned resident node to the MRU end. Returns the node that
    /// previously followed it toward MRU, or the node itself if it was
    /// already freshest.
    fn lru_refresh<K, V>(&mut self, pool: &mut NodePool<K, V>, e: NodeRef) -> NodeRef {
        debug_assert_ne!(e, self.lru);
        debug_assert_eq!(pool.get(e).refs, 1);
        let successor = pool.next_of(e);
        if successor == self.lru {
            return e;
        }
        pool.list_remove(e);
        pool.list_append(self.lru, e);
        successor
    }

    fn lookup_refresh<K, V>(&mut self, pool: &mut NodePool<K, V>, e: NodeRef, pin: bool) {
        if pin {
            self.ref_node(pool, e);
        } else if pool.get(e).refs == 1 {
            self.lru_refresh(pool, e);
        }
    }

    // -- primary operations ------------------------------------------------

    pub(crate) fn lookup<K: Copy + Eq, V>(
        &mut self,
        pool: &mut NodePool<K, V>,
        table: &NodeTable,
        key: K,
        hash: u32,
        pin: bool,
    ) -> Option<NodeRef> {
        let e = table.lookup(pool, key, hash)?;
        self.lookup_refresh(pool, e, pin);
        Some(e)
    }

    /// Refreshes an existing node for `key` under `tag`-free semantics, used
    /// by the shared cache's global-hit path.
    pub(crate) fn refresh_existing<K, V>(
        &mut self,
        pool: &mut NodePool<K, V>,
        e: NodeRef,
        pin: bool,
    ) {
        self.lookup_refresh(pool, e, pin);
    }

    pub(crate) fn insert<K: Copy + Eq, V>(
        &mut self,
        pool: &mut NodePool<K, V>,
        table: &mut NodeTable,
        key: K,
        hash: u32,
        pin: bool,
        hint_nonexist: bool,
    ) -> Option<NodeRef> {
        debug_assert!(self.capacity > 0);
        if !hint_nonexist {
            if let Some(e) = self.lookup(pool, table, key, hash, pin) {
                return Some(e);
            }
        } else {
            debug_assert!(
                table.lookup(pool, key, hash).is_none(),
                "nonexistence hint violated"
            );
        }

        let e = self.alloc_node(pool, table)?;
        pool.get_mut(e).rekey(key, hash);
        table.insert(pool, e);
        if pin {
            pool.get_mut(e).refs += 1;
            pool.list_append(self.in_use, e);
        } else {
            pool.list_append(self.lru, e);
        }
        self.size += 1;
        Some(e)
    }

    /// LRU-only insert/refresh: the target may never be pinned. On a hit the
    /// node moves to the MRU end and its old toward-MRU neighbour is returned
    /// as the successor; on a miss a node is allocated (evicting the coldest
    /// entry if needed) and the successor is `None`.
    pub(crate) fn refresh<K: Copy + Eq, V>(
        &mut self,
        pool: &mut NodePool<K, V>,
        table: &mut NodeTable,
        key: K,
        hash: u32,
    ) -> (Option<NodeRef>, Option<NodeRef>) {
        debug_assert!(self.capacity > 0);
        if let Some(e) = table.lookup(pool, key, hash) {
            let successor = self.lru_refresh(pool, e);
            return (Some(e), Some(successor));
        }
        let Some(e) = self.alloc_node(pool, table) else {
            return (None, None);
        };
        pool.get_mut(e).rekey(key, hash);
        table.insert(pool, e);
        pool.list_append(self.lru, e);
        self.size += 1;
        (Some(e), None)
    }

    pub(crate) fn release<K, V>(&mut self, pool: &mut NodePool<K, V>, e: NodeRef) {
        assert!(pool.get(e).refs > 1, "release of an unpinned handle");
        self.unref_node(pool, e);
        debug_assert!(pool.get(e).refs > 0);
    }

    pub(crate) fn pin<K, V>(&mut self, pool: &mut NodePool<K, V>, e: NodeRef) {
        self.ref_node(pool, e);
    }

    /// Removes an unpinned node from circulation. Fails (returns `false`)
    /// when the node is pinned or not resident.
    pub(crate) fn erase<K: Copy + Eq, V>(
        &mut self,
        pool: &mut NodePool<K, V>,
        table: &mut NodeTable,
        e: NodeRef,
    ) -> bool {
        if pool.get(e).refs != 1 {
            return false;
        }
        pool.list_remove(e);
        pool.list_append(self.erased, e);
        // Dropping refs to 0 here lets a double-erase trip the check above.
        pool.get_mut(e).refs -= 1;
        let (key, hash) = {
            let node = pool.get(e);
            (node.key, node.hash)
        };
        let removed = table.remove(pool, key, hash);
        debug_assert_eq!(removed, Some(e));
        self.size -= 1;
        self.capacity -= 1;
        true
    }

    /// Brings a slot back into circulation for `key`: reuses an erased slot
    /// if one exists, otherwise grows the pool by one node. The value slot is
    /// unspecified; the caller must overwrite it before reading.
    pub(crate) fn install<K: Copy + Eq + Default, V: Default>(
        &mut self,
        pool: &mut NodePool<K, V>,
        table: &mut NodeTable,
        key: K,
        hash: u32,
    ) -> NodeRef {
        let e = if pool.list_is_empty(self.erased) {
            pool.alloc_detached()
        } else {
            let e = pool.next_of(self.erased);
            pool.list_remove(e);
            e
        };
        pool.get_mut(e).rekey(key, hash);
        table.insert(pool, e);
        pool.list_append(self.lru, e);
        self.size += 1;
        self.capacity += 1;
        e
    }

    /// Yields one slot to the caller: from `free` if possible, else by
    /// evicting the coldest `lru` entry. Decrements capacity on success.
    pub(crate) fn preempt<K: Copy + Eq, V>(
        &mut self,
        pool: &mut NodePool<K, V>,
        table: &mut NodeTable,
    ) -> Option<NodeRef> {
        let e = self.alloc_node(pool, table)?;
        self.capacity -= 1;
        Some(e)
    }

    /// Accepts a slot yielded by another engine's `preempt`, putting it on
    /// the free list and growing capacity.
    pub(crate) fn assign<K, V>(&mut self, pool: &mut NodePool<K, V>, e: NodeRef) {
        self.capacity += 1;
        self.free_node(pool, e);
    }

    // -- traversal ---------------------------------------------------------

    pub(crate) fn for_each_lru<K, V>(&self, pool: &NodePool<K, V>, mut f: impl FnMut(&K, &V)) {
        let mut cur = pool.next_of(self.lru);
        while cur != self.lru {
            let node = pool.get(cur);
            f(&node.key, &node.value);
            cur = node.next;
        }
    }

    pub(crate) fn for_each_mru<K, V>(&self, pool: &NodePool<K, V>, mut f: impl FnMut(&K, &V)) {
        let mut cur = pool.prev_of(self.lru);
        while cur != self.lru {
            let node = pool.get(cur);
            f(&node.key, &node.value);
            cur = node.prev;
        }
    }

    pub(crate) fn for_each_until_lru<K, V>(
        &self,
        pool: &NodePool<K, V>,
        mut f: impl FnMut(&K, &V) -> bool,
    ) {
        let mut cur = pool.next_of(self.lru);
        while cur != self.lru {
            let node = pool.get(cur);
            if !f(&node.key, &node.value) {
                break;
            }
            cur = node.next;
        }
    }

    pub(crate) fn for_each_until_mru<K, V>(
        &self,
        pool: &NodePool<K, V>,
        mut f: impl FnMut(&K, &V) -> bool,
    ) {
        let mut cur = pool.prev_of(self.lru);
        while cur != self.lru {
            let node = pool.get(cur);
            if !f(&node.key, &node.value) {
                break;
            }
            cur = node.prev;
        }
    }

    pub(crate) fn for_each_in_use<K, V>(&self, pool: &NodePool<K, V>, mut f: impl FnMut(&K, &V)) {
        let mut cur = pool.next_of(self.in_use);
        while cur != self.in_use {
            let node = pool.get(cur);
            f(&node.key, &node.value);
            cur = node.next;
        }
    }

    #[cfg(any(test, debug_assertions))]
    pub(crate) fn debug_validate<K: Copy + Eq, V>(&self, pool: &NodePool<K, V>, table: &NodeTable) {
        for head in [self.free, self.lru, self.in_use, self.erased] {
            pool.debug_validate_list(head);
        }

        let mut cur = pool.next_of(self.free);
        while cur != self.free {
            assert_eq!(pool.get(cur).refs, 0, "free node with live refs");
            cur = pool.next_of(cur);
        }
        let mut lru_count = 0;
        cur = pool.next_of(self.lru);
        while cur != self.lru {
            let node = pool.get(cur);
            assert_eq!(node.refs, 1, "lru node must hold exactly the cache ref");
            assert_eq!(table.lookup(pool, node.key, node.hash), Some(cur));
            lru_count += 1;
            cur = node.next;
        }
        let mut in_use_count = 0;
        cur = pool.next_of(self.in_use);
        while cur != self.in_use {
            let node = pool.get(cur);
            assert!(node.refs >= 2, "in_use node must be pinned");
            assert_eq!(table.lookup(pool, node.key, node.hash), Some(cur));
            in_use_count += 1;
            cur = node.next;
        }

        assert_eq!(lru_count + in_use_count, self.size);
        assert_eq!(
            pool.list_len(self.free) + lru_count + in_use_count,
            self.capacity,
            "capacity must count exactly the slots in circulation"
        );
    }
}

impl fmt::Debug for LruCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCore")
            .field("size", &self.size)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

/// Owning LRU cache: node pool + hash index + list engine, with keys hashed
/// by `H`.
///
/// `K` must be cheap to copy (block numbers, hashed ids); the `Default`
/// bounds exist only so the arena can pre-allocate its slots. The cache
/// returns [`Handle`]s rather than value references; read or write a slot
/// through [`value`](Self::value) / [`value_mut`](Self::value_mut).
///
/// # Example
///
/// ```
/// use ghostkit::lru::LruCache;
///
/// let mut cache: LruCache<u32, u64> = LruCache::new(2);
/// let h = cache.insert(7, false).unwrap();
/// *cache.value_mut(h) = 700;
///
/// // Filling past capacity evicts the least-recently-used key.
/// cache.insert(8, false).unwrap();
/// cache.insert(9, false).unwrap();
/// assert!(cache.lookup(7, false).is_none());
/// assert_eq!(cache.size(), 2);
/// ```
pub struct LruCache<K, V, H = GHash> {
    pool: NodePool<K, V>,
    table: NodeTable,
    core: LruCore,
    hasher: H,
}

impl<K, V, H> LruCache<K, V, H>
where
    K: Copy + Eq + Default,
    V: Default,
    H: KeyHash<K>,
{
    /// Builds a cache with `capacity` pre-allocated slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        let mut pool = NodePool::with_capacity(capacity + 4);
        let table = NodeTable::with_capacity_for(capacity);
        let core = LruCore::init(&mut pool, capacity);
        Self {
            pool,
            table,
            core,
            hasher: H::default(),
        }
    }

    /// Like [`new`](Self::new), but runs `init` once per slot so the caller
    /// can seed the value of each node (e.g. point it at a physical frame).
    pub fn with_value_init(capacity: usize, init: impl FnMut(&mut V)) -> Self {
        let mut cache = Self::new(capacity);
        cache.core.for_each_free_value(&mut cache.pool, init);
        cache
    }

    /// Number of resident keys.
    #[inline]
    pub fn size(&self) -> usize {
        self.core.size()
    }

    /// Number of slots in circulation.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.core.capacity()
    }

    /// Inserts `key` if absent; refreshes and returns the existing node if
    /// present. With `pin` the returned node is pinned and must later be
    /// [`release`](Self::release)d. Returns `None` only when every slot is
    /// pinned.
    pub fn insert(&mut self, key: K, pin: bool) -> Option<Handle> {
        let hash = self.hasher.hash_key(&key);
        self.core
            .insert(&mut self.pool, &mut self.table, key, hash, pin, false)
            .map(Handle)
    }

    /// Insert for a key the caller knows is absent, skipping the lookup.
    ///
    /// Inserting a key that is in fact resident is a contract violation and
    /// trips a debug assertion.
    pub fn insert_nonexistent(&mut self, key: K, pin: bool) -> Option<Handle> {
        let hash = self.hasher.hash_key(&key);
        self.core
            .insert(&mut self.pool, &mut self.table, key, hash, pin, true)
            .map(Handle)
    }

    /// Looks up `key`; on a hit the node is refreshed (pinned if `pin`,
    /// otherwise moved to the MRU end).
    pub fn lookup(&mut self, key: K, pin: bool) -> Option<Handle> {
        let hash = self.hasher.hash_key(&key);
        self.core
            .lookup(&mut self.pool, &self.table, key, hash, pin)
            .map(Handle)
    }

    /// Looks up `key` without touching recency or refcounts.
    pub fn peek(&self, key: K) -> Option<Handle> {
        let hash = self.hasher.hash_key(&key);
        self.table.lookup(&self.pool, key, hash).map(Handle)
    }

    /// Releases a pinned handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle is not currently pinned.
    pub fn release(&mut self, h: Handle) {
        self.core.release(&mut self.pool, h.0);
    }

    /// Pins a resident handle so it cannot be evicted.
    pub fn pin(&mut self, h: Handle) {
        self.core.pin(&mut self.pool, h.0);
    }

    /// Removes an unpinned node from circulation; `size` and `capacity` both
    /// shrink by one. Returns `false` if the node is pinned.
    pub fn erase(&mut self, h: Handle) -> bool {
        self.core.erase(&mut self.pool, &mut self.table, h.0)
    }

    /// Adds a slot back into circulation under `key`; `size` and `capacity`
    /// both grow by one. The slot's value is whatever its previous owner
    /// left there and must be overwritten before use.
    pub fn install(&mut self, key: K) -> Handle {
        let hash = self.hasher.hash_key(&key);
        Handle(self.core.install(&mut self.pool, &mut self.table, key, hash))
    }

    /// Key stored in the node behind `h`.
    #[inline]
    pub fn key_of(&self, h: Handle) -> K {
        self.pool.get(h.0).key
    }

    /// Reads the value slot behind `h`.
    #[inline]
    pub fn value(&self, h: Handle) -> &V {
        &self.pool.get(h.0).value
    }

    /// Writes the value slot behind `h`.
    #[inline]
    pub fn value_mut(&mut self, h: Handle) -> &mut V {
        &mut self.pool.get_mut(h.0).value
    }

    /// Calls `f` on each resident unpinned entry, coldest first.
    pub fn for_each_lru(&self, f: impl FnMut(&K, &V)) {
        self.core.for_each_lru(&self.pool, f);
    }

    /// Calls `f` on each resident unpinned entry, freshest first.
    pub fn for_each_mru(&self, f: impl FnMut(&K, &V)) {
        self.core.for_each_mru(&self.pool, f);
    }

    /// Like [`for_each_lru`](Self::for_each_lru) but stops when `f` returns
    /// `false`.
    pub fn for_each_until_lru(&self, f: impl FnMut(&K, &V) -> bool) {
        self.core.for_each_until_lru(&self.pool, f);
    }

    /// Like [`for_each_mru`](Self::for_each_mru) but stops when `f` returns
    /// `false`.
    pub fn for_each_until_mru(&self, f: impl FnMut(&K, &V) -> bool) {
        self.core.for_each_until_mru(&self.pool, f);
    }

    /// Calls `f` on each pinned entry, in no particular order.
    pub fn for_each_in_use(&self, f: impl FnMut(&K, &V)) {
        self.core.for_each_in_use(&self.pool, f);
    }

    // -- intrusive surface for the ghost cache ----------------------------

    /// LRU-only insert/refresh with a caller-supplied hash; see
    /// [`LruCore::refresh`]. First element is the accessed node, second its
    /// pre-refresh successor (`None` on a new insertion).
    pub(crate) fn refresh_with_hash(&mut self, key: K, hash: u32) -> (Option<Handle>, Option<Handle>) {
        let (h, successor) = self
            .core
            .refresh(&mut self.pool, &mut self.table, key, hash);
        (h.map(Handle), successor.map(Handle))
    }

    /// The coldest unpinned resident node, if any.
    pub(crate) fn lru_oldest(&self) -> Option<Handle> {
        if self.pool.list_is_empty(self.core.lru_head()) {
            None
        } else {
            Some(Handle(self.pool.next_of(self.core.lru_head())))
        }
    }

    /// The node one step toward the MRU end from `h`.
    pub(crate) fn next_toward_mru(&self, h: Handle) -> Handle {
        let next = self.pool.next_of(h.0);
        debug_assert_ne!(
            next,
            self.core.lru_head(),
            "advanced a cursor past the MRU end"
        );
        Handle(next)
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        self.core.debug_validate(&self.pool, &self.table);
    }

    #[cfg(any(test, debug_assertions))]
    /// Resident unpinned keys, coldest first.
    pub fn debug_lru_keys(&self) -> Vec<K> {
        let mut keys = Vec::new();
        self.for_each_lru(|k, _| keys.push(*k));
        keys
    }

    #[cfg(any(test, debug_assertions))]
    /// Pinned keys, list order.
    pub fn debug_in_use_keys(&self) -> Vec<K> {
        let mut keys = Vec::new();
        self.for_each_in_use(|k, _| keys.push(*k));
        keys
    }
}

impl<K, V, H> fmt::Debug for LruCache<K, V, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("size", &self.core.size)
            .field("capacity", &self.core.capacity)
            .finish_non_exhaustive()
    }
}
