//! Process-related modules for discovery, classification and usage reads.
//!
//! This module provides:
//! - `classifier`: Rule-table based role assignment
//! - `scanner`: Process discovery from /proc
//! - `memory`: Resident memory parsing and the /proc usage reader
//! - `cpu`: CPU time parsing and delta-based CPU percent
//!
//! The sampler only talks to the [`ProcessSource`] and [`UsageReader`]
//! traits, so tests can drive it with synthetic processes.

pub mod classifier;
pub mod cpu;
pub mod memory;
pub mod scanner;

use thiserror::Error;

pub use classifier::{default_rules, normalize_cmdline, ProcessClassifier, ProcessDescriptor, RuleEntry};
pub use memory::ProcUsageReader;
pub use scanner::ProcScanner;

/// Failure to enumerate processes.
#[derive(Debug, Error)]
#[error("process enumeration failed: {0}")]
pub struct SourceError(#[from] pub std::io::Error);

/// Failure to read one process's usage.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReadError {
    #[error("process {0} no longer exists")]
    NotFound(u32),
    #[error("permission denied reading process {0}")]
    PermissionDenied(u32),
    #[error("read for process {0} timed out")]
    Timeout(u32),
    #[error("failed to read process {pid}: {reason}")]
    Other { pid: u32, reason: String },
}

impl ReadError {
    /// Maps an io error for `pid` onto the read error taxonomy.
    pub fn from_io(pid: u32, err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ReadError::NotFound(pid),
            std::io::ErrorKind::PermissionDenied => ReadError::PermissionDenied(pid),
            _ => ReadError::Other {
                pid,
                reason: err.to_string(),
            },
        }
    }
}

/// Memory and CPU usage of one process at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Usage {
    pub memory_bytes: u64,
    /// `None` until the reader has two CPU readings for the pid.
    pub cpu_percent: Option<f64>,
}

/// Supplies a fresh list of processes each tick.
pub trait ProcessSource: Send + Sync {
    fn snapshot(&self) -> Result<Vec<ProcessDescriptor>, SourceError>;
}

/// Reads memory and CPU for a pid. May block; the sampler bounds it with a
/// timeout.
pub trait UsageReader: Send + Sync {
    fn read(&self, pid: u32) -> Result<Usage, ReadError>;
}
