//! Multi-tenant LRU cache over one shared slot pool and hash index.
//!
//! Each tenant owns a logical LRU cache with its own capacity, but every
//! node lives in one arena and every key is indexed by one table, so a key
//! is resident at most once across all tenants and free capacity can move
//! between tenants without copying data.
//!
//! ```text
//!   ┌───────────────────────────────────────────────────────────────┐
//!   │                     SharedCache<T, K, V, H>                   │
//!   │                                                               │
//!   │   NodePool<K, Tagged<T, V>>        NodeTable (global)         │
//!   │   ┌───────────────────────┐   ┌───────────────────────────┐   │
//!   │   │ one arena, every node │   │ (hash, key) → node, over  │   │
//!   │   │ carries its owner tag │   │ all tenants               │   │
//!   │   └───────────────────────┘   └───────────────────────────┘   │
//!   │                                                               │
//!   │   tenants: FxHashMap<T, LruCore>                              │
//!   │   ┌─────────┐  ┌─────────┐  ┌─────────┐                       │
//!   │   │ core A  │  │ core B  │  │ core C  │   disjoint lists,     │
//!   │   │ cap 3   │  │ cap 2   │  │ cap 4   │   shared slots        │
//!   │   └─────────┘  └─────────┘  └─────────┘                       │
//!   └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`relocate`](SharedCache::relocate) transfers slots from one tenant to
//! another by preempting the source (free slot first, else its coldest
//! resident) and assigning the slot to the destination's free list.

use crate::ds::node::{Handle, NodePool};
use crate::ds::table::NodeTable;
use crate::hash::{GHash, KeyHash};
use crate::lru::LruCore;
use rustc_hash::FxHashMap;
use std::fmt;
use std::hash::Hash;

/// Node payload of a shared cache: the owning tenant's tag plus the
/// caller-visible value slot.
#[derive(Debug, Default, Clone, Copy)]
struct Tagged<T, V> {
    tag: T,
    value: V,
}

/// LRU cache partitioned among named tenants that share one slot pool and
/// one hash index.
///
/// # Example
///
/// ```
/// use ghostkit::shared::SharedCache;
///
/// let mut cache: SharedCache<u32, u32, u64> = SharedCache::new(&[(537, 3), (564, 2)]);
/// let h = cache.insert(537, 1, false).unwrap();
/// *cache.value_mut(h) = 111;
///
/// // Keys are global: tenant 564 inserting key 1 gets tenant 537's node.
/// let again = cache.insert(564, 1, false).unwrap();
/// assert_eq!(h, again);
/// assert_eq!(cache.tag_of(again), 537);
///
/// // Move both of tenant 537's free-able slots over to 564.
/// assert_eq!(cache.relocate(537, 564, 2), 2);
/// assert_eq!(cache.tenant_capacity(537), Some(1));
/// assert_eq!(cache.tenant_capacity(564), Some(4));
/// ```
pub struct SharedCache<T, K, V, H = GHash> {
    pool: NodePool<K, Tagged<T, V>>,
    table: NodeTable,
    tenants: FxHashMap<T, LruCore>,
    hasher: H,
}

impl<T, K, V, H> SharedCache<T, K, V, H>
where
    T: Copy + Eq + Hash + Default,
    K: Copy + Eq + Default,
    V: Default,
    H: KeyHash<K>,
{
    /// Builds a shared cache from `(tag, capacity)` tenant configs. One
    /// contiguous pool of `Σ capacity` slots is allocated and each tenant
    /// adopts a disjoint share of it.
    ///
    /// # Panics
    ///
    /// Panics on an empty config, a zero per-tenant capacity, or a duplicate
    /// tag.
    pub fn new(configs: &[(T, usize)]) -> Self {
        assert!(!configs.is_empty(), "at least one tenant is required");
        let total: usize = configs.iter().map(|&(_, cap)| cap).sum();
        assert!(total > 0);

        let mut pool = NodePool::with_capacity(total + 4 * configs.len());
        let table = NodeTable::with_capacity_for(total);
        let mut tenants =
            FxHashMap::with_capacity_and_hasher(configs.len(), Default::default());
        for &(tag, capacity) in configs {
            assert!(capacity > 0, "tenant capacity must be nonzero");
            let core = LruCore::init(&mut pool, capacity);
            let prev = tenants.insert(tag, core);
            assert!(prev.is_none(), "duplicate tenant tag");
        }
        Self {
            pool,
            table,
            tenants,
            hasher: H::default(),
        }
    }

    fn core_mut(&mut self, tag: T) -> &mut LruCore {
        self.tenants.get_mut(&tag).expect("unknown tenant tag")
    }

    fn owner_of(&self, h: Handle) -> T {
        self.pool.get(h.0).value.tag
    }

    /// Total slots in circulation across all tenants.
    pub fn total_capacity(&self) -> usize {
        self.tenants.values().map(LruCore::capacity).sum()
    }

    /// Slots in circulation for `tag`.
    pub fn tenant_capacity(&self, tag: T) -> Option<usize> {
        self.tenants.get(&tag).map(LruCore::capacity)
    }

    /// Resident keys for `tag`.
    pub fn tenant_size(&self, tag: T) -> Option<usize> {
        self.tenants.get(&tag).map(LruCore::size)
    }

    /// Inserts `key` under `tag` if absent anywhere. On a hit the node is
    /// refreshed under whichever tenant owns it and returned as-is. Returns
    /// `None` only when every slot of `tag` is pinned.
    ///
    /// # Panics
    ///
    /// Panics if `tag` was not configured.
    pub fn insert(&mut self, tag: T, key: K, pin: bool) -> Option<Handle> {
        let hash = self.hasher.hash_key(&key);
        if let Some(e) = self.table.lookup(&self.pool, key, hash) {
            let owner = self.pool.get(e).value.tag;
            let core = self.tenants.get_mut(&owner).expect("owner tenant missing");
            core.refresh_existing(&mut self.pool, e, pin);
            return Some(Handle(e));
        }
        let core = self.tenants.get_mut(&tag).expect("unknown tenant tag");
        let e = core.insert(&mut self.pool, &mut self.table, key, hash, pin, true)?;
        self.pool.get_mut(e).value.tag = tag;
        Some(Handle(e))
    }

    /// Tag-free lookup. On a hit the node is refreshed under its owner.
    ///
    /// FIXME: a non-owner's lookup promotes the slot in the owner's LRU, so
    /// a tenant that keeps reading a foreign key holds that slot resident in
    /// the owner's share indefinitely.
    pub fn lookup(&mut self, key: K, pin: bool) -> Option<Handle> {
        let hash = self.hasher.hash_key(&key);
        let e = self.table.lookup(&self.pool, key, hash)?;
        let owner = self.pool.get(e).value.tag;
        let core = self.tenants.get_mut(&owner).expect("owner tenant missing");
        core.refresh_existing(&mut self.pool, e, pin);
        Some(Handle(e))
    }

    /// Releases a pinned handle under its owning tenant.
    pub fn release(&mut self, h: Handle) {
        let owner = self.owner_of(h);
        let core = self.tenants.get_mut(&owner).expect("owner tenant missing");
        core.release(&mut self.pool, h.0);
    }

    /// Pins a resident handle under its owning tenant.
    pub fn pin(&mut self, h: Handle) {
        let owner = self.owner_of(h);
        let core = self.tenants.get_mut(&owner).expect("owner tenant missing");
        core.pin(&mut self.pool, h.0);
    }

    /// Removes an unpinned node from its owner's circulation; the owner's
    /// `size` and `capacity` both shrink by one. Returns `false` if pinned.
    pub fn erase(&mut self, h: Handle) -> bool {
        let owner = self.owner_of(h);
        let core = self.tenants.get_mut(&owner).expect("owner tenant missing");
        core.erase(&mut self.pool, &mut self.table, h.0)
    }

    /// Adds a slot into circulation under `tag` for `key`; `tag`'s `size`
    /// and `capacity` both grow by one. The value slot must be overwritten
    /// before use.
    pub fn install(&mut self, tag: T, key: K) -> Handle {
        let hash = self.hasher.hash_key(&key);
        let core = self.tenants.get_mut(&tag).expect("unknown tenant tag");
        let e = core.install(&mut self.pool, &mut self.table, key, hash);
        self.pool.get_mut(e).value.tag = tag;
        Handle(e)
    }

    /// Moves up to `count` slots of capacity from `src` to `dst`, evicting
    /// `src`'s coldest residents once its free list runs dry. Returns the
    /// number of slots actually moved, stopping early when `src` can yield
    /// no more (everything pinned).
    pub fn relocate(&mut self, src: T, dst: T, count: usize) -> usize {
        assert!(self.tenants.contains_key(&dst), "unknown tenant tag");
        let mut moved = 0;
        for _ in 0..count {
            let src_core = self.tenants.get_mut(&src).expect("unknown tenant tag");
            let Some(e) = src_core.preempt(&mut self.pool, &mut self.table) else {
                break;
            };
            let dst_core = self.tenants.get_mut(&dst).expect("unknown tenant tag");
            dst_core.assign(&mut self.pool, e);
            moved += 1;
        }
        moved
    }

    /// Read-only view of one tenant's logical cache, for introspection.
    pub fn get_cache(&self, tag: T) -> Option<TenantView<'_, T, K, V>> {
        let core = self.tenants.get(&tag)?;
        Some(TenantView {
            pool: &self.pool,
            core,
        })
    }

    /// Key stored in the node behind `h`.
    #[inline]
    pub fn key_of(&self, h: Handle) -> K {
        self.pool.get(h.0).key
    }

    /// Owning tenant of the node behind `h`.
    #[inline]
    pub fn tag_of(&self, h: Handle) -> T {
        self.owner_of(h)
    }

    /// Reads the value slot behind `h`.
    #[inline]
    pub fn value(&self, h: Handle) -> &V {
        &self.pool.get(h.0).value.value
    }

    /// Writes the value slot behind `h`.
    #[inline]
    pub fn value_mut(&mut self, h: Handle) -> &mut V {
        &mut self.pool.get_mut(h.0).value.value
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        for core in self.tenants.values() {
            core.debug_validate(&self.pool, &self.table);
        }
    }
}

impl<T, K, V, H> fmt::Debug for SharedCache<T, K, V, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedCache")
            .field("tenants", &self.tenants.len())
            .field("pool_nodes", &self.pool.len())
            .finish_non_exhaustive()
    }
}

/// Borrowed, read-only view of a single tenant's LRU cache.
pub struct TenantView<'a, T, K, V> {
    pool: &'a NodePool<K, Tagged<T, V>>,
    core: &'a LruCore,
}

impl<T, K, V> TenantView<'_, T, K, V> {
    /// Resident keys of this tenant.
    pub fn size(&self) -> usize {
        self.core.size()
    }

    /// Slots in circulation for this tenant.
    pub fn capacity(&self) -> usize {
        self.core.capacity()
    }

    /// Calls `f` on each resident unpinned entry, coldest first.
    pub fn for_each_lru(&self, mut f: impl FnMut(&K, &V)) {
        self.core
            .for_each_lru(self.pool, |key, tagged| f(key, &tagged.value));
    }

    /// Resident unpinned keys, coldest first.
    pub fn lru_keys(&self) -> Vec<K>
    where
        K: Copy,
    {
        let mut keys = Vec::new();
        self.for_each_lru(|k, _| keys.push(*k));
        keys
    }
}
