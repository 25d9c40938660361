//! CSV exchange formats for trace-driven simulation.
//!
//! Three formats, all plain comma-separated text with a header row:
//!
//! - **Request trace** (read): `timestamp,op,key,value_size` per row. An
//!   `op` of `get` replays as [`AccessMode::Default`]; anything else
//!   replays as [`AccessMode::Noop`] so it shapes the LRU order without
//!   counting. The timestamp is opaque and the value size is carried but
//!   unused by the ghost simulation.
//! - **Cache image** (read): first column is a resident key; replayed with
//!   `Noop` before the trace begins to pre-warm the LRU order.
//! - **MRC / perf record** (write): `num_blocks,hit_rate` rows for a curve,
//!   and a one-row summary of a benchmark run.

use crate::error::TraceError;
use crate::ghost::AccessMode;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

/// One parsed request-trace row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRequest {
    /// Object key, as spelled in the trace.
    pub key: String,
    /// Replay mode derived from the operation column.
    pub mode: AccessMode,
    /// Value size column; carried through, unused by the ghost simulation.
    pub value_size: u32,
}

/// Reads a 4-column request trace, skipping the header row. Rows with a
/// different column count are skipped; a malformed value size is an error.
pub fn read_request_trace(path: &Path) -> Result<Vec<TraceRequest>, TraceError> {
    let reader = BufReader::new(File::open(path)?);
    let mut requests = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if idx == 0 || line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != 4 {
            continue;
        }
        let value_size = fields[3]
            .trim()
            .parse::<u32>()
            .map_err(|err| TraceError::Parse {
                line: idx + 1,
                msg: format!("bad value size {:?}: {err}", fields[3]),
            })?;
        requests.push(TraceRequest {
            key: fields[2].to_string(),
            mode: if fields[1] == "get" {
                AccessMode::Default
            } else {
                AccessMode::Noop
            },
            value_size,
        });
    }
    Ok(requests)
}

/// Reads a cache-image file: the first column of each row (after the
/// header) is a key resident at capture time, coldest first.
pub fn read_cache_image(path: &Path) -> Result<Vec<String>, TraceError> {
    let reader = BufReader::new(File::open(path)?);
    let mut keys = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if idx == 0 || line.is_empty() {
            continue;
        }
        let key = line.split(',').next().unwrap_or("");
        if !key.is_empty() {
            keys.push(key.to_string());
        }
    }
    Ok(keys)
}

/// Writes a miss-ratio curve as `num_blocks,hit_rate` rows.
pub fn write_mrc_csv<W: Write>(mut out: W, curve: &[(u32, f64)]) -> io::Result<()> {
    writeln!(out, "num_blocks,hit_rate")?;
    for &(num_blocks, hit_rate) in curve {
        writeln!(out, "{num_blocks},{hit_rate:.6}")?;
    }
    Ok(())
}

/// One-row summary of a benchmark run: configuration, elapsed times, and
/// the sampled-vs-full curve error.
#[derive(Debug, Clone, PartialEq)]
pub struct PerfRecord {
    /// Workload tag (`seq`, `unif`, `zipf`).
    pub workload: String,
    /// Key universe size.
    pub num_blocks: u32,
    /// Accesses replayed.
    pub num_ops: u64,
    /// Candidate-size spacing.
    pub cache_tick: u32,
    /// Smallest candidate size.
    pub cache_min: u32,
    /// Largest candidate size.
    pub cache_max: u32,
    /// Admission shift of the sampled run.
    pub sample_shift: u32,
    /// Microseconds to drive a real LRU cache over the trace.
    pub baseline_us: u64,
    /// Microseconds for the full ghost cache.
    pub ghost_us: u64,
    /// Microseconds for the sampled ghost cache.
    pub sampled_us: u64,
    /// Mean absolute hit-rate error, sampled vs. full.
    pub mean_abs_err: f64,
    /// Maximum absolute hit-rate error, sampled vs. full.
    pub max_abs_err: f64,
}

/// Writes a perf record as a header plus one CSV row.
pub fn write_perf_csv<W: Write>(mut out: W, record: &PerfRecord) -> io::Result<()> {
    writeln!(
        out,
        "workload,num_blocks,num_ops,cache_tick,cache_min,cache_max,sample_shift,\
         baseline_us,ghost_us,sampled_us,mean_abs_err,max_abs_err"
    )?;
    writeln!(
        out,
        "{},{},{},{},{},{},{},{},{},{},{:.6},{:.6}",
        record.workload,
        record.num_blocks,
        record.num_ops,
        record.cache_tick,
        record.cache_min,
        record.cache_max,
        record.sample_shift,
        record.baseline_us,
        record.ghost_us,
        record.sampled_us,
        record.mean_abs_err,
        record.max_abs_err,
    )?;
    Ok(())
}

/// Mean and maximum absolute difference between two hit-rate curves,
/// matched by size. Points that are `NaN` on either side (no accesses
/// recorded there) are skipped; if nothing overlaps, both errors are `NaN`.
pub fn curve_error(a: &[(u32, f64)], b: &[(u32, f64)]) -> (f64, f64) {
    let mut sum = 0.0;
    let mut max = 0.0f64;
    let mut compared = 0usize;
    for (&(size_a, rate_a), &(size_b, rate_b)) in a.iter().zip(b.iter()) {
        debug_assert_eq!(size_a, size_b, "curves must share their size grid");
        if rate_a.is_nan() || rate_b.is_nan() {
            continue;
        }
        let err = (rate_a - rate_b).abs();
        sum += err;
        max = max.max(err);
        compared += 1;
    }
    if compared == 0 {
        return (f64::NAN, f64::NAN);
    }
    (sum / compared as f64, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn temp_file(name: &str, contents: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("ghostkit-trace-{}-{name}", std::process::id()));
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn request_trace_parses_ops_and_skips_bad_rows() {
        let path = temp_file(
            "reqs.csv",
            "ts,op,key,size\n\
             1,get,alpha,100\n\
             2,set,beta,200\n\
             malformed,row\n\
             3,get,gamma,300\n",
        );
        let requests = read_request_trace(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].key, "alpha");
        assert_eq!(requests[0].mode, AccessMode::Default);
        assert_eq!(requests[1].mode, AccessMode::Noop);
        assert_eq!(requests[2].value_size, 300);
    }

    #[test]
    fn request_trace_rejects_bad_value_size() {
        let path = temp_file("badsize.csv", "ts,op,key,size\n1,get,alpha,not-a-number\n");
        let err = read_request_trace(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn cache_image_reads_first_column() {
        let path = temp_file("image.csv", "key,extra\nk1,1\nk2,2\n\nk3\n");
        let keys = read_cache_image(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(keys, vec!["k1", "k2", "k3"]);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_request_trace(Path::new("/nonexistent/ghostkit.csv")).unwrap_err();
        assert!(matches!(err, TraceError::Io(_)));
    }

    #[test]
    fn mrc_csv_layout() {
        let mut out = Vec::new();
        write_mrc_csv(&mut out, &[(8, 0.25), (16, 0.5)]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "num_blocks,hit_rate");
        assert_eq!(lines[1], "8,0.250000");
        assert_eq!(lines[2], "16,0.500000");
    }

    #[test]
    fn perf_csv_is_one_row() {
        let record = PerfRecord {
            workload: "zipf".into(),
            num_blocks: 1024,
            num_ops: 4096,
            cache_tick: 64,
            cache_min: 64,
            cache_max: 1024,
            sample_shift: 5,
            baseline_us: 10,
            ghost_us: 20,
            sampled_us: 5,
            mean_abs_err: 0.01,
            max_abs_err: 0.02,
        };
        let mut out = Vec::new();
        write_perf_csv(&mut out, &record).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().nth(1).unwrap().starts_with("zipf,1024,4096,"));
    }

    #[test]
    fn curve_error_skips_nan_points() {
        let full = [(8u32, 0.5), (16, f64::NAN), (24, 0.9)];
        let sampled = [(8u32, 0.4), (16, 0.7), (24, 1.0)];
        let (mean, max) = curve_error(&full, &sampled);
        assert!((mean - 0.1).abs() < 1e-12);
        assert!((max - 0.1).abs() < 1e-12);
    }

    #[test]
    fn curve_error_with_no_overlap_is_nan() {
        let a = [(8u32, f64::NAN)];
        let b = [(8u32, 0.4)];
        let (mean, max) = curve_error(&a, &b);
        assert!(mean.is_nan());
        assert!(max.is_nan());
    }
}
