//! CPU statistics parsing for process metrics.
//!
//! This module parses CPU time from `/proc/<pid>/stat` and keeps the last
//! reading per pid so CPU percent can be computed from deltas.

use ahash::AHashMap as HashMap;
use once_cell::sync::Lazy;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Entries not refreshed for this long belong to exited processes.
const CPU_ENTRY_TTL: Duration = Duration::from_secs(120);

/// Get system clock ticks per second (usually 100, but can vary).
fn get_clk_tck() -> f64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf is safe to call with _SC_CLK_TCK
        // Returns -1 on error, 0 if undefined - both are handled by the > 0 check
        unsafe {
            let tck = libc::sysconf(libc::_SC_CLK_TCK);
            if tck > 0 {
                return tck as f64;
            }
        }
    }
    // Fallback to common default for error cases or non-Unix platforms
    100.0
}

/// System clock ticks per second (for CPU time calculation).
pub static CLK_TCK: Lazy<f64> = Lazy::new(get_clk_tck);

/// Parses total CPU time (user+system) in seconds from stat content.
pub fn parse_cpu_time_seconds(stat: &str) -> Result<f64, std::io::Error> {
    // Fields after the comm field; utime and stime are fields 14 and 15.
    let rest = stat
        .rfind(')')
        .map(|i| &stat[i + 1..])
        .ok_or_else(|| std::io::Error::other("Invalid stat format"))?;
    let parts: Vec<&str> = rest.split_whitespace().collect();
    if parts.len() <= 12 {
        return Err(std::io::Error::other("Invalid stat format"));
    }

    let utime: f64 = parts[11].parse().unwrap_or(0.0);
    let stime: f64 = parts[12].parse().unwrap_or(0.0);

    Ok((utime + stime) / *CLK_TCK)
}

/// Reads total CPU time in seconds for a process directory.
pub fn read_cpu_time_seconds(proc_path: &Path) -> Result<f64, std::io::Error> {
    let content = fs::read_to_string(proc_path.join("stat"))?;
    parse_cpu_time_seconds(&content)
}

struct CpuEntry {
    cpu_time_seconds: f64,
    last_updated: Instant,
}

/// Delta-based CPU percent per pid.
#[derive(Default)]
pub struct CpuTracker {
    cache: Mutex<HashMap<u32, CpuEntry>>,
}

impl CpuTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a cumulative CPU time for `pid` and returns the percent used
    /// since the previous observation.
    ///
    /// Returns `None` when there is no usable delta: the first observation of
    /// a pid, or a counter that went backwards because the pid was reused.
    pub fn observe(&self, pid: u32, cpu_time_seconds: f64, now: Instant) -> Option<f64> {
        let mut cache = match self.cache.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };

        let cpu_percent = cache.get(&pid).and_then(|entry| {
            let dt = now.saturating_duration_since(entry.last_updated).as_secs_f64();
            let delta_cpu = cpu_time_seconds - entry.cpu_time_seconds;
            (dt > 0.0 && delta_cpu >= 0.0).then(|| (delta_cpu / dt) * 100.0)
        });

        cache.insert(
            pid,
            CpuEntry {
                cpu_time_seconds,
                last_updated: now,
            },
        );
        cache.retain(|_, e| now.saturating_duration_since(e.last_updated) < CPU_ENTRY_TTL);

        cpu_percent
    }
}
