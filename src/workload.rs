//! Deterministic key-stream generators for benchmarks and the CLI tool.
//!
//! Three access patterns: a sequential scan, uniform random keys, and a
//! Zipfian distribution for realistically skewed traffic. Generators are
//! seeded explicitly so every run of a benchmark replays the same stream.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Zipf};

/// Key distribution of a generated stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Workload {
    /// Repeating scan over `[0, num_blocks)`.
    Sequential,
    /// Uniform random keys in `[0, num_blocks)`.
    Uniform,
    /// Zipfian keys in `[0, num_blocks)`; `theta` controls the skew
    /// (0.99 is the customary heavy-skew setting).
    Zipfian {
        /// Zipfian exponent.
        theta: f64,
    },
}

/// Everything needed to reproduce a key stream.
#[derive(Debug, Clone, Copy)]
pub struct WorkloadSpec {
    /// Size of the key universe.
    pub num_blocks: u32,
    /// Distribution to draw from.
    pub workload: Workload,
    /// RNG seed; equal specs yield equal streams.
    pub seed: u64,
}

impl WorkloadSpec {
    /// Builds the generator for this spec.
    pub fn generator(self) -> KeyGenerator {
        KeyGenerator::new(self)
    }
}

/// Infinite stream of `u32` keys following a [`WorkloadSpec`].
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    num_blocks: u32,
    workload: Workload,
    rng: SmallRng,
    scan_pos: u32,
    zipf: Option<Zipf<f64>>,
}

impl KeyGenerator {
    /// Builds a generator.
    ///
    /// # Panics
    ///
    /// Panics if `num_blocks` is zero or a Zipfian `theta` is not a valid
    /// exponent (must be finite and positive).
    pub fn new(spec: WorkloadSpec) -> Self {
        assert!(spec.num_blocks > 0, "num_blocks must be nonzero");
        let zipf = match spec.workload {
            Workload::Zipfian { theta } => Some(
                Zipf::new(spec.num_blocks as f64, theta)
                    .expect("invalid zipfian exponent"),
            ),
            _ => None,
        };
        Self {
            num_blocks: spec.num_blocks,
            workload: spec.workload,
            rng: SmallRng::seed_from_u64(spec.seed),
            scan_pos: 0,
            zipf,
        }
    }

    /// Draws the next key.
    pub fn next_key(&mut self) -> u32 {
        match self.workload {
            Workload::Sequential => {
                let key = self.scan_pos;
                self.scan_pos = (self.scan_pos + 1) % self.num_blocks;
                key
            }
            Workload::Uniform => (self.rng.random::<u64>() % self.num_blocks as u64) as u32,
            Workload::Zipfian { .. } => {
                let zipf = self.zipf.as_ref().expect("zipfian sampler missing");
                let sample: f64 = zipf.sample(&mut self.rng);
                ((sample as u64).saturating_sub(1).min(self.num_blocks as u64 - 1)) as u32
            }
        }
    }

    /// Draws `count` keys into a vector.
    pub fn take_keys(&mut self, count: usize) -> Vec<u32> {
        (0..count).map(|_| self.next_key()).collect()
    }
}

impl Iterator for KeyGenerator {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        Some(self.next_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(workload: Workload) -> WorkloadSpec {
        WorkloadSpec {
            num_blocks: 64,
            workload,
            seed: 0x537,
        }
    }

    #[test]
    fn sequential_wraps_around() {
        let mut generator = spec(Workload::Sequential).generator();
        let keys = generator.take_keys(130);
        assert_eq!(keys[0], 0);
        assert_eq!(keys[63], 63);
        assert_eq!(keys[64], 0);
        assert_eq!(keys[129], 1);
    }

    #[test]
    fn uniform_stays_in_range_and_replays() {
        let mut a = spec(Workload::Uniform).generator();
        let mut b = spec(Workload::Uniform).generator();
        let keys_a = a.take_keys(1000);
        let keys_b = b.take_keys(1000);
        assert_eq!(keys_a, keys_b, "equal seeds must replay identically");
        assert!(keys_a.iter().all(|&k| k < 64));
        // Not a constant stream.
        assert!(keys_a.iter().any(|&k| k != keys_a[0]));
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = spec(Workload::Uniform).generator();
        let mut b = WorkloadSpec {
            seed: 0x538,
            ..spec(Workload::Uniform)
        }
        .generator();
        assert_ne!(a.take_keys(100), b.take_keys(100));
    }

    #[test]
    fn zipfian_skews_toward_low_ranks() {
        let mut generator = spec(Workload::Zipfian { theta: 0.99 }).generator();
        let keys = generator.take_keys(10_000);
        assert!(keys.iter().all(|&k| k < 64));
        let head = keys.iter().filter(|&&k| k < 8).count();
        // With theta = 0.99 the top 8 of 64 ranks draw well over a third of
        // the accesses; uniform would give an eighth.
        assert!(head > keys.len() / 3, "head count {head}");
    }

    #[test]
    fn iterator_adapter_matches_next_key() {
        let mut a = spec(Workload::Uniform).generator();
        let b = spec(Workload::Uniform).generator();
        let direct: Vec<u32> = (0..10).map(|_| a.next_key()).collect();
        let iterated: Vec<u32> = b.take(10).collect();
        assert_eq!(direct, iterated);
    }
}
