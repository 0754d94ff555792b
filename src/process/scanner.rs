//! Process scanning utilities for discovering process entries from /proc.
//!
//! This module scans the /proc filesystem for numeric PID directories and
//! reads the command line and parent pid of each.

use std::fs;
use std::path::{Path, PathBuf};

use crate::process::{ProcessDescriptor, ProcessSource, SourceError};

/// Process entry representing a directory in /proc filesystem.
#[derive(Debug, Clone)]
pub struct ProcEntry {
    pub pid: u32,
    pub proc_path: PathBuf,
}

/// Scans a /proc-like directory for process entries with numeric PIDs.
pub fn collect_proc_entries(root: &Path) -> Result<Vec<ProcEntry>, std::io::Error> {
    let mut out = Vec::new();
    for entry in fs::read_dir(root)?.flatten() {
        let p = entry.path();
        let name = match p.file_name().and_then(|s| s.to_str()) {
            Some(v) => v,
            None => continue,
        };
        if !name.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let pid: u32 = match name.parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        out.push(ProcEntry { pid, proc_path: p });
    }
    Ok(out)
}

/// Reads the full command line, arguments joined by spaces.
///
/// Falls back to `comm` for kernel threads and zombies whose cmdline is empty.
pub fn read_cmdline(proc_path: &Path) -> Option<String> {
    if let Ok(content) = fs::read(proc_path.join("cmdline")) {
        let parts: Vec<String> = content
            .split(|&b| b == 0u8)
            .filter(|s| !s.is_empty())
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect();
        if !parts.is_empty() {
            return Some(parts.join(" "));
        }
    }

    let comm = fs::read_to_string(proc_path.join("comm")).ok()?;
    let t = comm.trim();
    (!t.is_empty()).then(|| t.to_string())
}

/// Reads the parent pid (field 4) from /proc/<pid>/stat.
pub fn read_ppid(proc_path: &Path) -> Option<u32> {
    let content = fs::read_to_string(proc_path.join("stat")).ok()?;
    parse_ppid(&content)
}

/// Parses the parent pid from stat content. The comm field may contain
/// spaces and parentheses, so fields are counted after the last ')'.
pub fn parse_ppid(stat: &str) -> Option<u32> {
    let rest = &stat[stat.rfind(')')? + 1..];
    rest.split_whitespace().nth(1)?.parse().ok()
}

/// /proc-backed process source.
pub struct ProcScanner {
    root: PathBuf,
    self_pid: u32,
}

impl Default for ProcScanner {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            self_pid: std::process::id(),
        }
    }
}

impl ProcessSource for ProcScanner {
    fn snapshot(&self) -> Result<Vec<ProcessDescriptor>, SourceError> {
        let entries = collect_proc_entries(&self.root)?;
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            // Our own command line may mention the patterns we look for.
            if entry.pid == self.self_pid {
                continue;
            }
            // Processes can exit mid-scan; skip whatever vanished.
            let Some(cmdline) = read_cmdline(&entry.proc_path) else {
                continue;
            };
            out.push(ProcessDescriptor {
                pid: entry.pid,
                cmdline,
                ppid: read_ppid(&entry.proc_path).unwrap_or(0),
            });
        }
        Ok(out)
    }
}
