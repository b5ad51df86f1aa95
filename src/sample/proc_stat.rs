use std::fs;
use std::path::{Path, PathBuf};
use std::str::SplitWhitespace;

use thiserror::Error;
use tracing::warn;

pub const PROC_STAT: &str = "/proc/stat";

const CPU_MARKER: &str = "cpu";

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("failed to open counter source {path}: {source}")]
    Init {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to re-read counter source {path}: {source}")]
    Source {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed cpu counter line: {line:?}")]
    Parse { line: String },
}

/// Cumulative time-in-state counters for one CPU slot, as exposed by the
/// kernel. Monotonically non-decreasing for the lifetime of the source.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
}

impl CpuTimes {
    /// Fraction of non-idle time between `prev` and `self`. Two identical
    /// readings (no counter activity since the last tick) yield 0.0.
    fn busy_fraction_since(&self, prev: &CpuTimes) -> f64 {
        let user = self.user.saturating_sub(prev.user);
        let nice = self.nice.saturating_sub(prev.nice);
        let system = self.system.saturating_sub(prev.system);
        let idle = self.idle.saturating_sub(prev.idle);

        let busy = user + nice + system;
        let total = busy + idle;
        if total == 0 {
            return 0.0;
        }
        busy as f64 / total as f64
    }
}

/// Incremental per-CPU utilization sampler over a /proc/stat-shaped source.
///
/// Slot 0 is the aggregate "cpu" line, slot N+1 the "cpuN" line. The slot
/// count is fixed when the sampler is opened; opening also primes the
/// previous-state table, so the first `sample()` call reports utilization
/// accumulated since construction and is always well defined.
#[derive(Debug)]
pub struct LoadSampler {
    path: PathBuf,
    prev: Vec<CpuTimes>,
}

impl LoadSampler {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SampleError> {
        let path = path.as_ref().to_path_buf();
        let content = fs::read_to_string(&path).map_err(|source| SampleError::Init {
            path: path.clone(),
            source,
        })?;

        let rows = scan_cpu_lines(&content)?;
        let mut prev = vec![CpuTimes::default(); rows.len()];
        for (slot, times) in rows {
            if slot < prev.len() {
                prev[slot] = times;
            } else {
                warn!(slot, ncpu = prev.len(), "cpu index outside slot table");
            }
        }

        Ok(LoadSampler { path, prev })
    }

    /// Number of CPU slots, aggregate included.
    pub fn ncpu(&self) -> usize {
        self.prev.len()
    }

    /// Re-reads the counter source and returns the utilization fraction of
    /// every slot since the previous call (or since `open`). The
    /// previous-state table is committed only after the whole read parsed,
    /// so a failed tick never leaves partially stale entries.
    pub fn sample(&mut self) -> Result<Vec<f64>, SampleError> {
        let content = fs::read_to_string(&self.path).map_err(|source| SampleError::Source {
            path: self.path.clone(),
            source,
        })?;

        let rows = scan_cpu_lines(&content)?;
        let mut loads = vec![0.0; self.prev.len()];
        let mut next = self.prev.clone();
        for (slot, times) in rows {
            let Some(prev) = self.prev.get(slot) else {
                // CPU hot-add after startup: the slot table is fixed for the
                // process lifetime, extra lines are ignored.
                warn!(slot, ncpu = self.prev.len(), "ignoring cpu line beyond slot table");
                continue;
            };
            loads[slot] = times.busy_fraction_since(prev);
            next[slot] = times;
        }
        self.prev = next;

        Ok(loads)
    }
}

/// Parses the contiguous run of cpu lines at the top of the source into
/// (slot, counters) pairs, stopping at the first non-cpu line.
fn scan_cpu_lines(content: &str) -> Result<Vec<(usize, CpuTimes)>, SampleError> {
    let mut rows = Vec::new();
    for line in content.lines() {
        let mut fields = line.split_whitespace();
        let slot = fields.next().and_then(cpu_slot);
        let Some(slot) = slot else {
            break;
        };
        let times = parse_counters(fields).ok_or_else(|| SampleError::Parse {
            line: line.to_string(),
        })?;
        rows.push((slot, times));
    }
    Ok(rows)
}

/// Slot index for a line label: "cpu" is the aggregate at slot 0, "cpuN" is
/// slot N+1. The assignment uses the embedded index, never encounter order.
fn cpu_slot(label: &str) -> Option<usize> {
    let suffix = label.strip_prefix(CPU_MARKER)?;
    if suffix.is_empty() {
        return Some(0);
    }
    suffix.parse::<usize>().ok().map(|n| n + 1)
}

/// The first four counters are user, nice, system and idle; any trailing
/// fields (iowait, irq, ...) are ignored.
fn parse_counters(mut fields: SplitWhitespace) -> Option<CpuTimes> {
    let user = fields.next()?.parse().ok()?;
    let nice = fields.next()?.parse().ok()?;
    let system = fields.next()?.parse().ok()?;
    let idle = fields.next()?.parse().ok()?;
    Some(CpuTimes {
        user,
        nice,
        system,
        idle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Measurement;

    fn write_stat(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("loadcast-{}-{name}", std::process::id()));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_delta_correctness() {
        let path = write_stat("delta", "cpu  10 0 5 85\n");
        let mut sampler = LoadSampler::open(&path).unwrap();
        assert_eq!(sampler.ncpu(), 1);

        fs::write(&path, "cpu  20 0 10 170\n").unwrap();
        let loads = sampler.sample().unwrap();
        assert_eq!(loads, vec![0.15]);
    }

    #[test]
    fn test_zero_activity_tick() {
        let path = write_stat("idle", "cpu  10 0 5 85\ncpu0 10 0 5 85\n");
        let mut sampler = LoadSampler::open(&path).unwrap();

        let loads = sampler.sample().unwrap();
        assert_eq!(loads, vec![0.0, 0.0]);
        assert!(loads.iter().all(|load| !load.is_nan()));
    }

    #[test]
    fn test_slot_assignment_ignores_line_order() {
        let path = write_stat(
            "order",
            "cpu1 0 0 0 100\ncpu  0 0 0 300\ncpu0 0 0 0 100\ncpu2 0 0 0 100\n",
        );
        let mut sampler = LoadSampler::open(&path).unwrap();
        assert_eq!(sampler.ncpu(), 4);

        // Only the aggregate and cpu1 get busy; the order of lines in the
        // source must not matter for where they land.
        fs::write(
            &path,
            "cpu1 50 0 0 150\ncpu  50 0 0 350\ncpu0 0 0 0 200\ncpu2 0 0 0 200\n",
        )
        .unwrap();
        let loads = sampler.sample().unwrap();
        assert_eq!(loads, vec![0.5, 0.0, 0.5, 0.0]);
    }

    #[test]
    fn test_trailing_fields_ignored() {
        let path = write_stat("trailing", "cpu  10 0 5 85 7 3 1 0 0 0\n");
        let mut sampler = LoadSampler::open(&path).unwrap();
        fs::write(&path, "cpu  20 0 10 170 99 99 99 99 99 99\n").unwrap();
        assert_eq!(sampler.sample().unwrap(), vec![0.15]);
    }

    #[test]
    fn test_scan_stops_at_first_non_cpu_line() {
        let path = write_stat(
            "tail",
            "cpu  10 0 5 85\ncpu0 10 0 5 85\nintr 12345 not numbers\nctxt 999\n",
        );
        let mut sampler = LoadSampler::open(&path).unwrap();
        assert_eq!(sampler.ncpu(), 2);
        assert!(sampler.sample().is_ok());
    }

    #[test]
    fn test_malformed_counter_is_parse_error() {
        let path = write_stat("badfield", "cpu  10 0 bogus 85\n");
        let err = LoadSampler::open(&path).unwrap_err();
        assert!(matches!(err, SampleError::Parse { .. }));
    }

    #[test]
    fn test_short_line_is_parse_error() {
        let path = write_stat("short", "cpu  10 0\n");
        assert!(matches!(
            LoadSampler::open(&path),
            Err(SampleError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_source_is_init_error() {
        let err = LoadSampler::open("/nonexistent/loadcast-stat").unwrap_err();
        assert!(matches!(err, SampleError::Init { .. }));
    }

    #[test]
    fn test_source_vanishing_is_source_error() {
        let path = write_stat("vanish", "cpu  10 0 5 85\n");
        let mut sampler = LoadSampler::open(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert!(matches!(
            sampler.sample(),
            Err(SampleError::Source { .. })
        ));
    }

    #[test]
    fn test_failed_tick_leaves_table_untouched() {
        let path = write_stat("atomic", "cpu  10 0 5 85\n");
        let mut sampler = LoadSampler::open(&path).unwrap();

        fs::write(&path, "cpu  nonsense\n").unwrap();
        assert!(sampler.sample().is_err());

        // The baseline must still be the one from open(), not half of the
        // failed read.
        fs::write(&path, "cpu  20 0 10 170\n").unwrap();
        assert_eq!(sampler.sample().unwrap(), vec![0.15]);
    }

    #[test]
    fn test_hot_added_cpu_is_ignored() {
        let path = write_stat("hotadd", "cpu  10 0 5 85\ncpu0 10 0 5 85\n");
        let mut sampler = LoadSampler::open(&path).unwrap();

        fs::write(
            &path,
            "cpu  20 0 10 170\ncpu0 20 0 10 170\ncpu1 5 0 5 90\n",
        )
        .unwrap();
        let loads = sampler.sample().unwrap();
        assert_eq!(loads.len(), 2);
        assert_eq!(loads, vec![0.15, 0.15]);
    }

    #[test]
    fn test_sample_encode_decode_end_to_end() {
        let path = write_stat(
            "e2e",
            "cpu  20 5 5 70\ncpu0 10 5 0 35\ncpu1 10 0 5 35\nintr 0\n",
        );
        let mut sampler = LoadSampler::open(&path).unwrap();
        assert_eq!(sampler.ncpu(), 3);

        fs::write(
            &path,
            "cpu  35 10 15 140\ncpu0 20 10 5 65\ncpu1 15 0 10 75\nintr 0\n",
        )
        .unwrap();
        let loads = sampler.sample().unwrap();
        assert_eq!(loads.len(), 3);
        assert_eq!(loads[0], 30.0 / 100.0);
        assert_eq!(loads[1], 20.0 / 50.0);
        assert_eq!(loads[2], 10.0 / 50.0);

        let measurement = Measurement::new(1700000000, 500000000, loads.clone());
        let buf = measurement.encode();
        assert_eq!(buf.len(), 48);

        let decoded = Measurement::decode(&buf).unwrap();
        assert_eq!(decoded.seconds, 1700000000);
        assert_eq!(decoded.nanoseconds, 500000000);
        assert_eq!(decoded.loads, loads);
    }
}
