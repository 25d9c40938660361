//! Benchmark tool: replay a synthetic workload through a real LRU cache, a
//! full ghost cache, and a sampled ghost cache, then write the resulting
//! miss-ratio curves and a one-row perf record.
//!
//! ```text
//! mrc-bench --workload=zipf --num_blocks=262144 --num_ops=1048576 \
//!           --cache_tick=8192 --cache_min=8192 --cache_max=262144 \
//!           --zipf_theta=0.99 --rand_seed=537 --result_dir=results
//! ```
//!
//! Outputs under `--result_dir`: `ghost_mrc.csv`, `sampled_mrc.csv` (unless
//! disabled), and `perf.csv`.

use clap::{Parser, ValueEnum};
use ghostkit::ghost::{GhostCache, SampledGhostCache};
use ghostkit::lru::LruCache;
use ghostkit::trace::{curve_error, write_mrc_csv, write_perf_csv, PerfRecord};
use ghostkit::workload::{Workload, WorkloadSpec};
use std::fs::{self, File};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

/// Admission shift of the sampled run (1/32 sampling).
const SAMPLE_SHIFT: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum WorkloadArg {
    /// Repeating sequential scan.
    Seq,
    /// Uniform random keys.
    Unif,
    /// Zipfian keys (see --zipf_theta).
    Zipf,
}

#[derive(Debug, Parser)]
#[command(name = "mrc-bench", about = "Miss-ratio-curve benchmark driver")]
struct Args {
    /// Key distribution to replay.
    #[arg(long, value_enum, default_value_t = WorkloadArg::Zipf)]
    workload: WorkloadArg,

    /// Directory for the output CSV files.
    #[arg(long = "result_dir", default_value = "results")]
    result_dir: PathBuf,

    /// Size of the key universe.
    #[arg(long = "num_blocks", default_value_t = 262_144)]
    num_blocks: u32,

    /// Number of accesses to replay.
    #[arg(long = "num_ops", default_value_t = 1_048_576)]
    num_ops: u64,

    /// Zipfian exponent.
    #[arg(long = "zipf_theta", default_value_t = 0.99)]
    zipf_theta: f64,

    /// Spacing between candidate cache sizes.
    #[arg(long = "cache_tick", default_value_t = 8_192)]
    cache_tick: u32,

    /// Smallest candidate cache size.
    #[arg(long = "cache_min", default_value_t = 8_192)]
    cache_min: u32,

    /// Largest candidate cache size (inclusive).
    #[arg(long = "cache_max", default_value_t = 262_144)]
    cache_max: u32,

    /// Skip the full ghost simulation.
    #[arg(long = "no_ghost")]
    no_ghost: bool,

    /// Skip the sampled ghost simulation.
    #[arg(long = "no_sampled")]
    no_sampled: bool,

    /// Seed for the workload generator.
    #[arg(long = "rand_seed", default_value_t = 0x537)]
    rand_seed: u64,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("mrc-bench: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let workload = match args.workload {
        WorkloadArg::Seq => Workload::Sequential,
        WorkloadArg::Unif => Workload::Uniform,
        WorkloadArg::Zipf => Workload::Zipfian {
            theta: args.zipf_theta,
        },
    };
    let spec = WorkloadSpec {
        num_blocks: args.num_blocks,
        workload,
        seed: args.rand_seed,
    };

    let mut generator = spec.generator();
    let keys = generator.take_keys(args.num_ops as usize);

    // Baseline: drive a real LRU cache of the largest candidate size.
    let mut baseline: LruCache<u32, u32> = LruCache::new(args.cache_max as usize);
    let started = Instant::now();
    for &key in &keys {
        baseline.insert(key, false);
    }
    let baseline_us = started.elapsed().as_micros() as u64;

    let mut ghost_us = 0u64;
    let mut ghost_curve = None;
    if !args.no_ghost {
        let mut ghost: GhostCache =
            GhostCache::try_new(args.cache_tick, args.cache_min, args.cache_max)?;
        let started = Instant::now();
        for &key in &keys {
            ghost.access(key);
        }
        ghost_us = started.elapsed().as_micros() as u64;
        ghost_curve = Some(ghost.hit_rate_curve());
    }

    let mut sampled_us = 0u64;
    let mut sampled_curve = None;
    if !args.no_sampled {
        let mut sampled: SampledGhostCache<SAMPLE_SHIFT> =
            SampledGhostCache::try_new(args.cache_tick, args.cache_min, args.cache_max)?;
        let started = Instant::now();
        for &key in &keys {
            sampled.access(key);
        }
        sampled_us = started.elapsed().as_micros() as u64;
        sampled_curve = Some(sampled.hit_rate_curve());
    }

    let (mean_abs_err, max_abs_err) = match (&ghost_curve, &sampled_curve) {
        (Some(full), Some(sampled)) => curve_error(full, sampled),
        _ => (f64::NAN, f64::NAN),
    };

    fs::create_dir_all(&args.result_dir)?;
    if let Some(curve) = &ghost_curve {
        write_mrc_csv(File::create(args.result_dir.join("ghost_mrc.csv"))?, curve)?;
    }
    if let Some(curve) = &sampled_curve {
        write_mrc_csv(
            File::create(args.result_dir.join("sampled_mrc.csv"))?,
            curve,
        )?;
    }

    let workload_tag = match args.workload {
        WorkloadArg::Seq => "seq",
        WorkloadArg::Unif => "unif",
        WorkloadArg::Zipf => "zipf",
    };
    let record = PerfRecord {
        workload: workload_tag.to_string(),
        num_blocks: args.num_blocks,
        num_ops: args.num_ops,
        cache_tick: args.cache_tick,
        cache_min: args.cache_min,
        cache_max: args.cache_max,
        sample_shift: if args.no_sampled { 0 } else { SAMPLE_SHIFT },
        baseline_us,
        ghost_us,
        sampled_us,
        mean_abs_err,
        max_abs_err,
    };
    write_perf_csv(File::create(args.result_dir.join("perf.csv"))?, &record)?;

    print_summary(&record, ghost_curve.as_deref(), sampled_curve.as_deref());
    Ok(())
}

fn print_summary(record: &PerfRecord, ghost: Option<&[(u32, f64)]>, sampled: Option<&[(u32, f64)]>) {
    println!(
        "workload={} blocks={} ops={} baseline={}us ghost={}us sampled={}us",
        record.workload,
        record.num_blocks,
        record.num_ops,
        record.baseline_us,
        record.ghost_us,
        record.sampled_us,
    );
    let (Some(ghost), Some(sampled)) = (ghost, sampled) else {
        return;
    };
    println!("==================== Hit Rate ====================");
    println!("{:>10}  {:>12}  {:>12}", "size", "full", "sampled");
    for (&(size, full_rate), &(_, sampled_rate)) in ghost.iter().zip(sampled.iter()) {
        println!(
            "{:>10}  {:>11.3}%  {:>11.3}%",
            size,
            full_rate * 100.0,
            sampled_rate * 100.0
        );
    }
    println!(
        "mean_abs_err={:.4} max_abs_err={:.4}",
        record.mean_abs_err, record.max_abs_err
    );
}
