//! Resident memory parsing and the /proc-backed usage reader.
//!
//! Resident set size comes from `smaps_rollup` when the kernel provides it and
//! from the `VmRSS` line of `status` otherwise.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::process::cpu::{read_cpu_time_seconds, CpuTracker};
use crate::process::{ReadError, Usage, UsageReader};

/// Parses kilobyte values from smaps/status file lines.
pub fn parse_kb_value(v: &str) -> Option<u64> {
    v.split_whitespace().next()?.parse().ok()
}

/// Sums `Rss:` lines of smaps_rollup content, in bytes.
pub fn parse_rollup_rss(content: &str) -> Option<u64> {
    let mut found = false;
    let mut rss_kb = 0;
    for line in content.lines() {
        if let Some(v) = line.strip_prefix("Rss:") {
            rss_kb += parse_kb_value(v).unwrap_or(0);
            found = true;
        }
    }
    found.then_some(rss_kb * 1024)
}

/// Extracts `VmRSS` from status content, in bytes.
pub fn parse_status_rss(content: &str) -> Option<u64> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(parse_kb_value)
        .map(|kb| kb * 1024)
}

/// Reads resident memory in bytes for a process directory.
pub fn read_rss_bytes(proc_path: &Path) -> Result<u64, std::io::Error> {
    if let Ok(content) = fs::read_to_string(proc_path.join("smaps_rollup")) {
        if let Some(rss) = parse_rollup_rss(&content) {
            return Ok(rss);
        }
    }

    let content = fs::read_to_string(proc_path.join("status"))?;
    // Kernel threads and zombies have no VmRSS line.
    parse_status_rss(&content).ok_or_else(|| std::io::Error::other("no VmRSS in status"))
}

/// /proc-backed usage reader.
pub struct ProcUsageReader {
    root: PathBuf,
    cpu: CpuTracker,
}

impl Default for ProcUsageReader {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcUsageReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cpu: CpuTracker::new(),
        }
    }
}

impl UsageReader for ProcUsageReader {
    fn read(&self, pid: u32) -> Result<Usage, ReadError> {
        let proc_path = self.root.join(pid.to_string());
        let memory_bytes = read_rss_bytes(&proc_path).map_err(|e| ReadError::from_io(pid, &e))?;
        let cpu_time = read_cpu_time_seconds(&proc_path).map_err(|e| ReadError::from_io(pid, &e))?;
        let cpu_percent = self.cpu.observe(pid, cpu_time, Instant::now());

        Ok(Usage {
            memory_bytes,
            cpu_percent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Tests for parse_kb_value
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_kb_value() {
        // Standard smaps format with trailing "kB"
        assert_eq!(parse_kb_value("       1234 kB"), Some(1234));
        assert_eq!(parse_kb_value("0 kB"), Some(0));
        assert_eq!(parse_kb_value(""), None);
        assert_eq!(parse_kb_value("abc kB"), None);
    }

    #[test]
    fn test_parse_rss_sources() {
        let rollup = "55d5f6a2c000-7ffd3b9fe000 ---p 00000000 00:00 0 [rollup]\nRss:               20480 kB\nPss:               10240 kB\n";
        assert_eq!(parse_rollup_rss(rollup), Some(20480 * 1024));
        assert_eq!(parse_rollup_rss("Pss: 1 kB\n"), None);

        let status = "Name:\tpython3\nVmPeak:\t  300 kB\nVmRSS:\t   1500 kB\n";
        assert_eq!(parse_status_rss(status), Some(1500 * 1024));
        assert_eq!(parse_status_rss("Name:\tkthreadd\n"), None);
    }

    #[test]
    fn test_reader_maps_missing_process_to_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let reader = ProcUsageReader::new(tmp.path());
        assert_eq!(reader.read(999), Err(ReadError::NotFound(999)));
    }

    #[test]
    fn test_reader_reads_fake_proc() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("77");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("status"), "Name:\tx\nVmRSS:\t2048 kB\n").unwrap();
        fs::write(
            dir.join("stat"),
            "77 (x) S 1 77 77 0 -1 0 0 0 0 0 10 5 0 0 20 0 1 0 100",
        )
        .unwrap();

        let reader = ProcUsageReader::new(tmp.path());
        let usage = reader.read(77).unwrap();
        assert_eq!(usage.memory_bytes, 2048 * 1024);
        assert_eq!(usage.cpu_percent, None);
    }
}
