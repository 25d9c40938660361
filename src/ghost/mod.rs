//! Ghost caches: online miss-ratio-curve estimation for LRU caches.
//!
//! A ghost cache simulates the reference stream of an LRU cache without
//! storing any payload. One pass over the trace yields, for every candidate
//! size in `{min_size, min_size + tick, .., max_size}`, the hit/miss counts
//! a standalone LRU cache of that size would have produced, in O(num_ticks)
//! work per access instead of one simulation per size.
//!
//! ## How it works
//!
//! The engine keeps a single LRU list at `max_size` capacity plus a cursor
//! per size class (`boundaries`). Each resident node carries a `size_idx`:
//! the node would miss in a cache of `min_size + size_idx·tick` entries but
//! hit in the next class up. An access to a node with `size_idx = j` is
//! therefore a hit for every candidate size above class `j`, so the access
//! increments `reuse_dist[j]`; per-size hit counts fall out as prefix sums.
//!
//! ```text
//!   LRU end                                          MRU end
//!     │  A     B     C  │  D     E  │  F     G     H  │
//!     │  size_idx = 2   │  idx = 1  │     idx = 0     │
//!     ▲                 ▲           ▲
//!     eviction      boundaries[1]  boundaries[0]
//!     victim        (min+tick)     (min_size)
//! ```
//!
//! On every access the boundaries below the touched class each advance one
//! node toward the MRU end, promoting the node they step over into the next
//! size class; the touched node itself resets to class 0 at the MRU end.
//!
//! ## Variants
//!
//! - [`GhostCache`]: fixed-size block keys (`u32`).
//! - [`SampledGhostCache`]: admits only keys whose hash has `SHIFT` leading
//!   zero bits and tracks a `2^-SHIFT` scale model, trading a bounded error
//!   for memory and time.
//! - [`GhostKvCache`] / [`SampledGhostKvCache`]: string keys with a byte
//!   size per entry, reporting the curve by entry count and byte footprint.

mod cache;
mod kv;

pub use cache::{GhostCache, SampledGhostCache};
pub use kv::{CurvePoint, GhostKvCache, GhostKvMeta, SampledGhostKvCache};

use crate::ds::node::Handle;
use crate::error::ConfigError;
use crate::hash::IdHash;
use crate::lru::LruCache;
use crate::stat::CacheStat;
use std::cell::{Cell, RefCell};

/// How an access contributes to the histogram. The LRU state is updated
/// identically in every mode; only the statistics differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Count a hit at the access's reuse class, or a plain miss.
    #[default]
    Default,
    /// Count the access, crediting no size class.
    AsMiss,
    /// Count a hit for every size class.
    AsHit,
    /// Leave the statistics untouched.
    Noop,
}

/// Per-node metadata a ghost engine threads through its LRU slots.
pub(crate) trait GhostMeta: Default {
    fn size_idx(&self) -> u32;
    fn set_size_idx(&mut self, idx: u32);
}

impl GhostMeta for u32 {
    #[inline]
    fn size_idx(&self) -> u32 {
        *self
    }

    #[inline]
    fn set_size_idx(&mut self, idx: u32) {
        *self = idx;
    }
}

/// Size-class engine shared by the block and KV ghost caches. Keys are
/// already-hashed `u32` images; callers supply the hash used for sampling.
pub(crate) struct GhostEngine<M: GhostMeta> {
    tick: u32,
    min_size: u32,
    max_size: u32,
    num_ticks: u32,
    /// Entries currently on the LRU list, saturating at `max_size`.
    lru_size: u32,
    cache: LruCache<u32, M, IdHash>,
    /// `boundaries[i]` trails the node one step beyond `min_size + i·tick`
    /// stack positions from the LRU end (`None` while the list is shorter).
    boundaries: Vec<Option<Handle>>,
    /// `reuse_dist[j]` counts hits whose reuse class was `j`.
    reuse_dist: Vec<u64>,
    reuse_count: u64,
    stats: RefCell<Vec<CacheStat>>,
    stats_dirty: Cell<bool>,
}

impl<M: GhostMeta> GhostEngine<M> {
    pub(crate) fn try_new(tick: u32, min_size: u32, max_size: u32) -> Result<Self, ConfigError> {
        if tick == 0 {
            return Err(ConfigError::new("tick must be > 0"));
        }
        if min_size <= 1 {
            return Err(ConfigError::new("min_size must be > 1"));
        }
        if max_size <= min_size {
            return Err(ConfigError::new("max_size must exceed min_size"));
        }
        if (max_size - min_size) % tick != 0 {
            return Err(ConfigError::new(
                "max_size - min_size must be a multiple of tick",
            ));
        }
        let num_ticks = (max_size - min_size) / tick + 1;
        if num_ticks < 3 {
            return Err(ConfigError::new(
                "at least three size classes are required (num_ticks > 2)",
            ));
        }
        Ok(Self {
            tick,
            min_size,
            max_size,
            num_ticks,
            lru_size: 0,
            cache: LruCache::new(max_size as usize),
            boundaries: vec![None; (num_ticks - 1) as usize],
            reuse_dist: vec![0; num_ticks as usize],
            reuse_count: 0,
            stats: RefCell::new(vec![CacheStat::default(); num_ticks as usize]),
            stats_dirty: Cell::new(false),
        })
    }

    #[inline]
    pub(crate) fn tick(&self) -> u32 {
        self.tick
    }

    #[inline]
    pub(crate) fn min_size(&self) -> u32 {
        self.min_size
    }

    #[inline]
    pub(crate) fn max_size(&self) -> u32 {
        self.max_size
    }

    #[inline]
    pub(crate) fn num_ticks(&self) -> u32 {
        self.num_ticks
    }

    /// Distinct keys currently tracked.
    pub(crate) fn live_len(&self) -> usize {
        self.cache.size()
    }

    /// Core access step: refresh the LRU, maintain boundary cursors and
    /// size classes, update the histogram per `mode`. Returns the accessed
    /// node so callers can attach extra metadata.
    pub(crate) fn access(&mut self, key: u32, hash: u32, mode: AccessMode) -> Handle {
        let (h, successor) = self.cache.refresh_with_hash(key, hash);
        let h = h.expect("ghost slots are never pinned, so allocation cannot fail");

        let size_idx;
        match successor {
            Some(_) => {
                // Hit: the node's class decides which boundaries trail it.
                // If a boundary sat on the node itself, it inherits the
                // node's old neighbour now that the node moved to MRU.
                size_idx = self.cache.value(h).size_idx();
                if size_idx < self.num_ticks - 1 {
                    let slot = &mut self.boundaries[size_idx as usize];
                    if *slot == Some(h) {
                        *slot = successor;
                    }
                }
            }
            None => {
                // Miss: the list grew (or recycled its coldest slot at
                // max_size). Every boundary at or below the new length
                // advances; a boundary whose threshold the list just reached
                // starts trailing from the LRU end.
                if self.lru_size < self.max_size {
                    self.lru_size += 1;
                }
                let n = self.lru_size;
                size_idx = if n <= self.min_size {
                    0
                } else {
                    (n - self.min_size).div_ceil(self.tick)
                };
                if size_idx < self.num_ticks - 1 && n == size_idx * self.tick + self.min_size {
                    self.boundaries[size_idx as usize] = self.cache.lru_oldest();
                }
            }
        }

        for slot in self.boundaries[..size_idx as usize].iter_mut() {
            if let Some(b) = *slot {
                let meta = self.cache.value_mut(b);
                let idx = meta.size_idx();
                meta.set_size_idx(idx + 1);
                *slot = Some(self.cache.next_toward_mru(b));
            }
        }
        self.cache.value_mut(h).set_size_idx(0);

        match mode {
            AccessMode::Default => {
                if successor.is_some() {
                    self.reuse_dist[size_idx as usize] += 1;
                }
                self.reuse_count += 1;
                self.stats_dirty.set(true);
            }
            AccessMode::AsMiss => {
                self.reuse_count += 1;
                self.stats_dirty.set(true);
            }
            AccessMode::AsHit => {
                self.reuse_dist[0] += 1;
                self.reuse_count += 1;
                self.stats_dirty.set(true);
            }
            AccessMode::Noop => {}
        }
        h
    }

    fn class_of(&self, cache_size: u32) -> usize {
        assert!(
            (self.min_size..=self.max_size).contains(&cache_size),
            "cache size out of range"
        );
        assert_eq!(
            (cache_size - self.min_size) % self.tick,
            0,
            "cache size not aligned to tick"
        );
        ((cache_size - self.min_size) / self.tick) as usize
    }

    fn rebuild_stats(&self) {
        if !self.stats_dirty.get() {
            return;
        }
        let mut stats = self.stats.borrow_mut();
        let mut hits = 0u64;
        for (dist, slot) in self.reuse_dist.iter().zip(stats.iter_mut()) {
            hits += dist;
            *slot = CacheStat {
                hit_cnt: hits,
                miss_cnt: self.reuse_count - hits,
            };
        }
        self.stats_dirty.set(false);
    }

    /// Hit/miss counts an LRU cache of exactly `cache_size` entries would
    /// have produced. `cache_size` must lie on a tick.
    pub(crate) fn get_stat(&self, cache_size: u32) -> CacheStat {
        let class = self.class_of(cache_size);
        self.rebuild_stats();
        self.stats.borrow()[class]
    }

    pub(crate) fn get_hit_rate(&self, cache_size: u32) -> f64 {
        self.get_stat(cache_size).hit_rate()
    }

    pub(crate) fn get_miss_rate(&self, cache_size: u32) -> f64 {
        self.get_stat(cache_size).miss_rate()
    }

    /// Zeroes the histogram and access counter; LRU state is untouched.
    pub(crate) fn reset_stat(&mut self) {
        self.reuse_dist.fill(0);
        self.reuse_count = 0;
        self.stats_dirty.set(true);
    }

    pub(crate) fn meta_mut(&mut self, h: Handle) -> &mut M {
        self.cache.value_mut(h)
    }

    /// Metadata of a resident key, without refreshing the LRU.
    pub(crate) fn peek_meta_mut(&mut self, key: u32) -> Option<&mut M> {
        let h = self.cache.peek(key)?;
        Some(self.cache.value_mut(h))
    }

    pub(crate) fn for_each_lru(&self, mut f: impl FnMut(u32, &M)) {
        self.cache.for_each_lru(|k, m| f(*k, m));
    }

    pub(crate) fn for_each_mru(&self, mut f: impl FnMut(u32, &M)) {
        self.cache.for_each_mru(|k, m| f(*k, m));
    }

    pub(crate) fn for_each_until_lru(&self, mut f: impl FnMut(u32, &M) -> bool) {
        self.cache.for_each_until_lru(|k, m| f(*k, m));
    }

    pub(crate) fn for_each_until_mru(&self, mut f: impl FnMut(u32, &M) -> bool) {
        self.cache.for_each_until_mru(|k, m| f(*k, m));
    }

    #[cfg(any(test, debug_assertions))]
    /// Keys the boundary cursors currently trail, lowest size class first.
    pub(crate) fn boundary_keys(&self) -> Vec<Option<u32>> {
        self.boundaries
            .iter()
            .map(|slot| slot.map(|h| self.cache.key_of(h)))
            .collect()
    }

    #[cfg(any(test, debug_assertions))]
    pub(crate) fn lru_keys(&self) -> Vec<u32> {
        self.cache.debug_lru_keys()
    }
}
