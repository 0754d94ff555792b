//! Per-role bounded sample history.
//!
//! `HistoryStore` keeps one ringbuffer per role. Writes take the shard's
//! exclusive lock and reads copy the buffer under the shared lock, so a
//! reader always gets a complete, ordered snapshot.

use dashmap::DashMap;
use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;

use crate::ringbuffer::Ringbuffer;
use crate::roles::{Role, Sample};

/// Errors returned by [`HistoryStore::append`].
#[derive(Debug, Error, PartialEq)]
pub enum HistoryError {
    #[error("sample for {role} at {got}s is not newer than the last sample at {last}s")]
    OutOfOrder { role: Role, last: f64, got: f64 },
    #[error("sample role {sample} does not match buffer role {role}")]
    RoleMismatch { role: Role, sample: Role },
}

/// Sub-range of a role's history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Window {
    /// Everything retained.
    All,
    /// The newest N samples.
    Count(usize),
    /// Samples no older than W seconds before the newest sample.
    Seconds(f64),
}

impl FromStr for Window {
    type Err = String;

    /// Parses `all`, a bare count (`120`), or a duration with an
    /// `s`/`m`/`h` suffix (`300s`, `5m`, `1h`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if s.is_empty() || s == "all" {
            return Ok(Window::All);
        }
        let (digits, scale) = match s.chars().last() {
            Some('s') => (&s[..s.len() - 1], Some(1.0)),
            Some('m') => (&s[..s.len() - 1], Some(60.0)),
            Some('h') => (&s[..s.len() - 1], Some(3600.0)),
            _ => (s.as_str(), None),
        };
        let n: u64 = digits
            .parse()
            .map_err(|_| format!("invalid window '{}', expected all, N, Ns, Nm or Nh", s))?;
        Ok(match scale {
            Some(scale) => Window::Seconds(n as f64 * scale),
            None => Window::Count(n as usize),
        })
    }
}

/// Statistics about the history store.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryStats {
    pub capacity: usize,
    pub lengths: Vec<(Role, usize)>,
}

/// Bounded per-role time series. The sampler is the only writer.
pub struct HistoryStore {
    buffers: DashMap<Role, Ringbuffer<Sample>>,
}

impl HistoryStore {
    /// Creates a store with one empty buffer of `capacity` per role.
    pub fn new(capacity: usize) -> Self {
        let buffers = DashMap::new();
        for role in Role::ALL {
            buffers.insert(role, Ringbuffer::new(capacity));
        }
        Self { buffers }
    }

    /// Appends a sample, evicting the oldest one when the buffer is full.
    ///
    /// Rejects samples that are not strictly newer than the role's last one.
    pub fn append(&self, role: Role, sample: Sample) -> Result<(), HistoryError> {
        if sample.role != role {
            return Err(HistoryError::RoleMismatch {
                role,
                sample: sample.role,
            });
        }
        let mut buffer = self.buffers.entry(role).or_insert_with(|| Ringbuffer::new(1));
        if let Some(last) = buffer.last() {
            if sample.monotonic_secs <= last.monotonic_secs {
                return Err(HistoryError::OutOfOrder {
                    role,
                    last: last.monotonic_secs,
                    got: sample.monotonic_secs,
                });
            }
        }
        buffer.push(sample);
        Ok(())
    }

    /// Returns the requested window in chronological order.
    pub fn range(&self, role: Role, window: Window) -> Vec<Sample> {
        let Some(buffer) = self.buffers.get(&role) else {
            return Vec::new();
        };
        match window {
            Window::All => buffer.get_history(),
            Window::Count(n) => buffer.tail(n),
            Window::Seconds(secs) => {
                let Some(newest) = buffer.last().map(|s| s.monotonic_secs) else {
                    return Vec::new();
                };
                let cutoff = newest - secs;
                let mut all = buffer.get_history();
                let first = all.partition_point(|s| s.monotonic_secs < cutoff);
                all.split_off(first)
            }
        }
    }

    /// Returns the newest sample for a role.
    pub fn latest(&self, role: Role) -> Option<Sample> {
        self.buffers.get(&role).and_then(|b| b.last().cloned())
    }

    /// Number of samples retained for a role.
    pub fn len(&self, role: Role) -> usize {
        self.buffers.get(&role).map(|b| b.len()).unwrap_or(0)
    }

    /// Applies a capacity from configuration; a smaller capacity evicts the
    /// oldest samples.
    pub fn ensure_capacity(&self, capacity: usize) {
        for mut buffer in self.buffers.iter_mut() {
            if buffer.capacity() != capacity {
                buffer.resize(capacity);
            }
        }
    }

    /// Returns statistics about the store.
    pub fn get_stats(&self) -> HistoryStats {
        let capacity = self
            .buffers
            .get(&Role::Service)
            .map(|b| b.capacity())
            .unwrap_or(0);
        HistoryStats {
            capacity,
            lengths: Role::ALL.iter().map(|r| (*r, self.len(*r))).collect(),
        }
    }

    /// Releases all retained samples.
    pub fn clear(&self) {
        for mut buffer in self.buffers.iter_mut() {
            buffer.clear();
        }
    }
}
