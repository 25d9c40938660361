//! Block-keyed ghost caches, full and sampled.

use super::{AccessMode, GhostEngine};
use crate::error::ConfigError;
use crate::hash::{GHash, KeyHash};
use crate::stat::CacheStat;
use std::fmt;

/// Ghost cache over `u32` block keys.
///
/// Tracks the reference stream once and answers, for every candidate size
/// `min_size + i·tick` up to `max_size` inclusive, the hit/miss counts a
/// standalone LRU cache of that size would have produced.
///
/// # Example
///
/// ```
/// use ghostkit::ghost::GhostCache;
///
/// let mut ghost: GhostCache = GhostCache::new(1, 3, 6);
/// for key in [0, 1, 2, 3, 4, 5, 2, 4] {
///     ghost.access(key);
/// }
/// // The re-accesses of 2 and 4 sat 4 and 3 positions deep, so a cache of
/// // 3 entries catches one of them and a cache of 4 catches both.
/// assert_eq!(ghost.get_stat(3).hit_cnt, 1);
/// assert_eq!(ghost.get_stat(4).hit_cnt, 2);
/// assert_eq!(ghost.get_stat(3).acc_cnt(), 8);
/// ```
pub struct GhostCache<H: KeyHash<u32> = GHash> {
    pub(super) engine: GhostEngine<u32>,
    pub(super) hasher: H,
}

impl<H: KeyHash<u32>> GhostCache<H> {
    /// Builds a ghost cache tracking sizes `min_size, min_size + tick, …,
    /// max_size`.
    ///
    /// Requires `tick > 0`, `min_size > 1`, `max_size = min_size + k·tick`
    /// for some `k ≥ 2`.
    pub fn try_new(tick: u32, min_size: u32, max_size: u32) -> Result<Self, ConfigError> {
        Ok(Self {
            engine: GhostEngine::try_new(tick, min_size, max_size)?,
            hasher: H::default(),
        })
    }

    /// Panicking variant of [`try_new`](Self::try_new).
    ///
    /// # Panics
    ///
    /// Panics if the parameters are rejected by [`try_new`](Self::try_new).
    pub fn new(tick: u32, min_size: u32, max_size: u32) -> Self {
        match Self::try_new(tick, min_size, max_size) {
            Ok(ghost) => ghost,
            Err(err) => panic!("invalid ghost cache parameters: {err}"),
        }
    }

    /// Records one access to `key`.
    pub fn access(&mut self, key: u32) {
        self.access_with_mode(key, AccessMode::Default);
    }

    /// Records one access to `key` with an explicit statistics mode.
    pub fn access_with_mode(&mut self, key: u32, mode: AccessMode) {
        let hash = self.hasher.hash_key(&key);
        self.engine.access(key, hash, mode);
    }

    /// Spacing between candidate sizes.
    pub fn tick(&self) -> u32 {
        self.engine.tick()
    }

    /// Smallest candidate size.
    pub fn min_size(&self) -> u32 {
        self.engine.min_size()
    }

    /// Largest candidate size (inclusive).
    pub fn max_size(&self) -> u32 {
        self.engine.max_size()
    }

    /// Number of candidate sizes.
    pub fn num_ticks(&self) -> u32 {
        self.engine.num_ticks()
    }

    /// Distinct keys currently tracked.
    pub fn live_len(&self) -> usize {
        self.engine.live_len()
    }

    /// Hit/miss counts for a cache of exactly `cache_size` entries.
    ///
    /// # Panics
    ///
    /// Panics if `cache_size` is out of range or not tick-aligned.
    pub fn get_stat(&self, cache_size: u32) -> CacheStat {
        self.engine.get_stat(cache_size)
    }

    /// Hit rate for `cache_size`; `NaN` before the first counted access.
    pub fn get_hit_rate(&self, cache_size: u32) -> f64 {
        self.engine.get_hit_rate(cache_size)
    }

    /// Miss rate for `cache_size`; `NaN` before the first counted access.
    pub fn get_miss_rate(&self, cache_size: u32) -> f64 {
        self.engine.get_miss_rate(cache_size)
    }

    /// `(size, hit_rate)` for every candidate size, smallest first.
    pub fn hit_rate_curve(&self) -> Vec<(u32, f64)> {
        (0..self.num_ticks())
            .map(|i| {
                let size = self.min_size() + i * self.tick();
                (size, self.get_hit_rate(size))
            })
            .collect()
    }

    /// Zeroes the statistics; LRU state is untouched.
    pub fn reset_stat(&mut self) {
        self.engine.reset_stat();
    }

    /// Calls `f` on every tracked key, coldest first. Replaying the emitted
    /// sequence into a fresh instance with [`AccessMode::Noop`] reconstructs
    /// the LRU order without touching its statistics.
    pub fn for_each_lru(&self, mut f: impl FnMut(u32)) {
        self.engine.for_each_lru(|k, _| f(k));
    }

    /// Calls `f` on every tracked key, freshest first.
    pub fn for_each_mru(&self, mut f: impl FnMut(u32)) {
        self.engine.for_each_mru(|k, _| f(k));
    }

    /// Like [`for_each_lru`](Self::for_each_lru) but stops when `f` returns
    /// `false`.
    pub fn for_each_until_lru(&self, mut f: impl FnMut(u32) -> bool) {
        self.engine.for_each_until_lru(|k, _| f(k));
    }

    /// Like [`for_each_mru`](Self::for_each_mru) but stops when `f` returns
    /// `false`.
    pub fn for_each_until_mru(&self, mut f: impl FnMut(u32) -> bool) {
        self.engine.for_each_until_mru(|k, _| f(k));
    }

    #[cfg(any(test, debug_assertions))]
    /// Keys the boundary cursors currently trail, lowest size class first.
    pub fn debug_boundary_keys(&self) -> Vec<Option<u32>> {
        self.engine.boundary_keys()
    }

    #[cfg(any(test, debug_assertions))]
    /// Tracked keys, coldest first.
    pub fn debug_lru_keys(&self) -> Vec<u32> {
        self.engine.lru_keys()
    }
}

impl<H: KeyHash<u32>> fmt::Debug for GhostCache<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GhostCache")
            .field("tick", &self.tick())
            .field("min_size", &self.min_size())
            .field("max_size", &self.max_size())
            .field("live_len", &self.live_len())
            .finish_non_exhaustive()
    }
}

/// Sampling ghost cache: admits only keys whose hash carries `SHIFT`
/// leading zero bits (a `2^-SHIFT` admission rate) and simulates at
/// `2^-SHIFT` scale. Queries take full-scale sizes and are mapped down.
///
/// `tick`, `min_size`, and `max_size` must each be divisible by
/// `2^SHIFT`, and the hash must distribute its high-order bits uniformly
/// (see [`crate::hash`]).
///
/// # Example
///
/// ```
/// use ghostkit::ghost::SampledGhostCache;
///
/// let mut sampled: SampledGhostCache<5> = SampledGhostCache::new(64, 64, 1024);
/// for key in 0..4096u32 {
///     sampled.access(key);
/// }
/// assert_eq!(sampled.sample_shift(), 5);
/// assert_eq!(sampled.max_size(), 1024);
/// // The model itself holds at most 1024 >> 5 entries.
/// assert!(sampled.live_len() <= 32);
/// ```
pub struct SampledGhostCache<const SHIFT: u32 = 5, H: KeyHash<u32> = GHash> {
    inner: GhostCache<H>,
}

impl<const SHIFT: u32, H: KeyHash<u32>> SampledGhostCache<SHIFT, H> {
    /// Builds a sampled ghost cache. Parameters are full-scale; each must be
    /// divisible by `2^SHIFT` and remain valid after scaling down.
    pub fn try_new(tick: u32, min_size: u32, max_size: u32) -> Result<Self, ConfigError> {
        if SHIFT >= 32 {
            return Err(ConfigError::new("sample shift must be below the hash width"));
        }
        let unit = 1u32 << SHIFT;
        for (name, value) in [("tick", tick), ("min_size", min_size), ("max_size", max_size)] {
            if value % unit != 0 {
                return Err(ConfigError::new(format!(
                    "{name} must be divisible by 2^{SHIFT}"
                )));
            }
        }
        Ok(Self {
            inner: GhostCache::try_new(tick >> SHIFT, min_size >> SHIFT, max_size >> SHIFT)?,
        })
    }

    /// Panicking variant of [`try_new`](Self::try_new).
    ///
    /// # Panics
    ///
    /// Panics if the parameters are rejected by [`try_new`](Self::try_new).
    pub fn new(tick: u32, min_size: u32, max_size: u32) -> Self {
        match Self::try_new(tick, min_size, max_size) {
            Ok(ghost) => ghost,
            Err(err) => panic!("invalid sampled ghost cache parameters: {err}"),
        }
    }

    /// Records one access to `key` if its hash passes the admission filter.
    pub fn access(&mut self, key: u32) {
        self.access_with_mode(key, AccessMode::Default);
    }

    /// Records one access with an explicit statistics mode, subject to the
    /// admission filter.
    pub fn access_with_mode(&mut self, key: u32, mode: AccessMode) {
        let hash = self.inner.hasher.hash_key(&key);
        if SHIFT > 0 && hash >> (32 - SHIFT) != 0 {
            return;
        }
        self.inner.engine.access(key, hash, mode);
    }

    /// Admission shift; the cache samples `2^-shift` of the keyspace.
    pub fn sample_shift(&self) -> u32 {
        SHIFT
    }

    /// Full-scale spacing between candidate sizes.
    pub fn tick(&self) -> u32 {
        self.inner.tick() << SHIFT
    }

    /// Full-scale smallest candidate size.
    pub fn min_size(&self) -> u32 {
        self.inner.min_size() << SHIFT
    }

    /// Full-scale largest candidate size (inclusive).
    pub fn max_size(&self) -> u32 {
        self.inner.max_size() << SHIFT
    }

    /// Distinct admitted keys currently tracked.
    pub fn live_len(&self) -> usize {
        self.inner.live_len()
    }

    /// Estimated hit/miss counts for a full-scale cache of `cache_size`
    /// entries. Counts are of admitted accesses only; rates estimate the
    /// full stream.
    ///
    /// # Panics
    ///
    /// Panics if `cache_size` is out of range or not aligned to the
    /// full-scale tick.
    pub fn get_stat(&self, cache_size: u32) -> CacheStat {
        self.inner.get_stat(cache_size >> SHIFT)
    }

    /// Estimated hit rate for a full-scale `cache_size`.
    pub fn get_hit_rate(&self, cache_size: u32) -> f64 {
        self.inner.get_hit_rate(cache_size >> SHIFT)
    }

    /// Estimated miss rate for a full-scale `cache_size`.
    pub fn get_miss_rate(&self, cache_size: u32) -> f64 {
        self.inner.get_miss_rate(cache_size >> SHIFT)
    }

    /// `(full-scale size, hit_rate)` for every candidate size.
    pub fn hit_rate_curve(&self) -> Vec<(u32, f64)> {
        self.inner
            .hit_rate_curve()
            .into_iter()
            .map(|(size, rate)| (size << SHIFT, rate))
            .collect()
    }

    /// Zeroes the statistics; LRU state is untouched.
    pub fn reset_stat(&mut self) {
        self.inner.reset_stat();
    }

    /// Calls `f` on every admitted key, coldest first.
    pub fn for_each_lru(&self, f: impl FnMut(u32)) {
        self.inner.for_each_lru(f);
    }

    /// Calls `f` on every admitted key, freshest first.
    pub fn for_each_mru(&self, f: impl FnMut(u32)) {
        self.inner.for_each_mru(f);
    }
}

impl<const SHIFT: u32, H: KeyHash<u32>> fmt::Debug for SampledGhostCache<SHIFT, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampledGhostCache")
            .field("shift", &SHIFT)
            .field("tick", &self.tick())
            .field("min_size", &self.min_size())
            .field("max_size", &self.max_size())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::IdHash;

    #[test]
    fn constructor_rejects_malformed_parameters() {
        assert!(GhostCache::<GHash>::try_new(0, 3, 6).is_err());
        assert!(GhostCache::<GHash>::try_new(1, 1, 6).is_err());
        assert!(GhostCache::<GHash>::try_new(1, 6, 6).is_err());
        assert!(GhostCache::<GHash>::try_new(2, 3, 6).is_err());
        // Only two size classes.
        assert!(GhostCache::<GHash>::try_new(1, 3, 4).is_err());
        assert!(GhostCache::<GHash>::try_new(1, 3, 5).is_ok());
    }

    #[test]
    fn sampled_constructor_rejects_unaligned_parameters() {
        assert!(SampledGhostCache::<5, GHash>::try_new(64, 64, 1000).is_err());
        assert!(SampledGhostCache::<5, GHash>::try_new(60, 64, 1024).is_err());
        assert!(SampledGhostCache::<5, GHash>::try_new(64, 64, 1024).is_ok());
        // Scaled-down parameters must still be valid (min_size >> 5 == 1).
        assert!(SampledGhostCache::<5, GHash>::try_new(32, 32, 1024).is_err());
    }

    #[test]
    #[should_panic(expected = "not aligned")]
    fn get_stat_panics_off_tick() {
        let ghost: GhostCache = GhostCache::new(2, 2, 8);
        ghost.get_stat(5);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn get_stat_panics_out_of_range() {
        let ghost: GhostCache = GhostCache::new(2, 2, 8);
        ghost.get_stat(10);
    }

    #[test]
    fn stats_before_any_access_are_nan() {
        let ghost: GhostCache = GhostCache::new(1, 3, 6);
        assert!(ghost.get_hit_rate(3).is_nan());
        assert_eq!(ghost.get_stat(6), CacheStat::default());
    }

    #[test]
    fn cold_misses_count_against_every_size() {
        let mut ghost: GhostCache<IdHash> = GhostCache::new(1, 3, 6);
        for key in 0..4 {
            ghost.access(key);
        }
        for size in 3..=6 {
            let stat = ghost.get_stat(size);
            assert_eq!(stat.hit_cnt, 0);
            assert_eq!(stat.miss_cnt, 4);
        }
    }

    #[test]
    fn reset_stat_keeps_lru_state() {
        let mut ghost: GhostCache<IdHash> = GhostCache::new(1, 3, 6);
        for key in [0, 1, 2, 0] {
            ghost.access(key);
        }
        assert_eq!(ghost.get_stat(3).hit_cnt, 1);

        ghost.reset_stat();
        assert_eq!(ghost.get_stat(3), CacheStat::default());
        assert_eq!(ghost.debug_lru_keys(), vec![1, 2, 0]);

        // A re-access after the reset is still a hit: the order survived.
        ghost.access(1);
        assert_eq!(ghost.get_stat(3).hit_cnt, 1);
        assert_eq!(ghost.get_stat(3).acc_cnt(), 1);
    }

    #[test]
    fn noop_updates_order_but_not_stats() {
        let mut ghost: GhostCache<IdHash> = GhostCache::new(1, 3, 6);
        for key in [0, 1, 2] {
            ghost.access_with_mode(key, AccessMode::Noop);
        }
        assert_eq!(ghost.get_stat(3), CacheStat::default());
        assert_eq!(ghost.debug_lru_keys(), vec![0, 1, 2]);
    }

    #[test]
    fn as_hit_credits_every_size_class() {
        let mut ghost: GhostCache<IdHash> = GhostCache::new(1, 3, 6);
        ghost.access_with_mode(99, AccessMode::AsHit);
        for size in 3..=6 {
            assert_eq!(ghost.get_stat(size).hit_cnt, 1);
            assert_eq!(ghost.get_stat(size).miss_cnt, 0);
        }
    }

    #[test]
    fn as_miss_counts_without_crediting() {
        let mut ghost: GhostCache<IdHash> = GhostCache::new(1, 3, 6);
        for key in [0, 1, 0] {
            ghost.access_with_mode(key, AccessMode::AsMiss);
        }
        for size in 3..=6 {
            assert_eq!(ghost.get_stat(size).hit_cnt, 0);
            assert_eq!(ghost.get_stat(size).miss_cnt, 3);
        }
    }

    #[test]
    fn shift_zero_sampled_matches_full_ghost() {
        let mut full: GhostCache = GhostCache::new(2, 2, 8);
        let mut sampled: SampledGhostCache<0> = SampledGhostCache::new(2, 2, 8);
        let keys = [3u32, 1, 4, 1, 5, 9, 2, 6, 5, 3, 5, 8, 9, 7, 9, 3, 2, 3, 8, 4];
        for &key in &keys {
            full.access(key);
            sampled.access(key);
        }
        for size in [2u32, 4, 6, 8] {
            assert_eq!(full.get_stat(size), sampled.get_stat(size));
        }
    }

    #[test]
    fn sampled_admits_a_fraction() {
        let mut sampled: SampledGhostCache<5> = SampledGhostCache::new(64, 64, 1024);
        let mut counted = 0u64;
        for key in 0..4096u32 {
            sampled.access(key);
        }
        for size in (64..=1024).step_by(64) {
            counted = counted.max(sampled.get_stat(size as u32).acc_cnt());
        }
        // Roughly 1/32 of 4096 distinct keys pass the filter.
        assert!((32..=512).contains(&counted), "admitted {counted}");
    }

    mod reference_model {
        use super::*;
        use std::collections::VecDeque;

        /// Straightforward LRU simulator used as ground truth.
        pub(super) struct RefLru {
            capacity: usize,
            order: VecDeque<u32>,
        }

        impl RefLru {
            pub(super) fn new(capacity: usize) -> Self {
                Self {
                    capacity,
                    order: VecDeque::new(),
                }
            }

            /// Returns `true` on a hit.
            pub(super) fn access(&mut self, key: u32) -> bool {
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

        #[test]
        fn ref_lru_behaves() {
            let mut lru = RefLru::new(2);
            assert!(!lru.access(1));
            assert!(!lru.access(2));
            assert!(lru.access(1));
            assert!(!lru.access(3)); // evicts 2
            assert!(!lru.access(2));
            assert!(lru.access(3));
        }
    }

    mod property_tests {
        use super::reference_model::RefLru;
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// The ghost's per-size hit counts equal independent LRU
            /// simulations of every candidate size.
            #[cfg_attr(miri, ignore)]
            #[test]
            fn prop_matches_independent_lru_simulations(
                keys in prop::collection::vec(0u32..24, 1..250)
            ) {
                let (tick, min_size, max_size) = (2u32, 2u32, 12u32);
                let mut ghost: GhostCache<IdHash> = GhostCache::new(tick, min_size, max_size);
                let mut refs: Vec<(u32, RefLru, u64)> = (0..=(max_size - min_size) / tick)
                    .map(|i| {
                        let size = min_size + i * tick;
                        (size, RefLru::new(size as usize), 0u64)
                    })
                    .collect();

                for &key in &keys {
                    ghost.access(key);
                    for (_, lru, hits) in refs.iter_mut() {
                        if lru.access(key) {
                            *hits += 1;
                        }
                    }
                }

                for (size, _, hits) in &refs {
                    let stat = ghost.get_stat(*size);
                    prop_assert_eq!(stat.hit_cnt, *hits, "size {}", size);
                    prop_assert_eq!(stat.acc_cnt(), keys.len() as u64);
                }
            }

            /// Hit counts never decrease with cache size.
            #[cfg_attr(miri, ignore)]
            #[test]
            fn prop_hit_counts_monotone_in_size(
                keys in prop::collection::vec(0u32..40, 1..250)
            ) {
                let mut ghost: GhostCache<IdHash> = GhostCache::new(3, 2, 14);
                for &key in &keys {
                    ghost.access(key);
                }
                let mut last = 0u64;
                for size in (2..=14).step_by(3) {
                    let hits = ghost.get_stat(size as u32).hit_cnt;
                    prop_assert!(hits >= last);
                    last = hits;
                }
            }
        }
    }
}
