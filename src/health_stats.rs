//! Health statistics for the sampler and push channel.
//!
//! Counters are atomics updated by the sampler; the `/health` and `/metrics`
//! endpoints read them without coordination.

use chrono::{DateTime, Utc};
use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Instant;

use crate::roles::Role;

/// Running statistics for a single metric.
#[derive(Clone, Copy, Default)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
            self.last = value;
            self.sum = value;
            self.count = 1;
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

/// Thread-safe wrapper for running statistics.
#[derive(Default)]
pub struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    pub fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    /// (last, avg, max, min, count)
    pub fn snapshot(&self) -> (f64, f64, f64, f64, u64) {
        if let Ok(s) = self.inner.lock() {
            (s.last, s.avg(), s.max, s.min, s.count)
        } else {
            (0.0, 0.0, 0.0, 0.0, 0)
        }
    }
}

/// Per-role counters.
#[derive(Default)]
pub struct RoleCounters {
    pub samples_appended: AtomicU64,
    pub read_failures: AtomicU64,
    pub unmatched_ticks: AtomicU64,
}

/// Health statistics for the monitor.
pub struct HealthStats {
    pub ticks_total: AtomicU64,
    pub tick_failures: AtomicU64,
    pub tick_duration_seconds: Stat,
    pub service: RoleCounters,
    pub supervisor: RoleCounters,
    pub subscribers_dropped: AtomicU64,
    last_tick: RwLock<Option<DateTime<Utc>>>,
    start_time: Instant,
}

impl Default for HealthStats {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthStats {
    pub fn new() -> Self {
        Self {
            ticks_total: AtomicU64::new(0),
            tick_failures: AtomicU64::new(0),
            tick_duration_seconds: Stat::default(),
            service: RoleCounters::default(),
            supervisor: RoleCounters::default(),
            subscribers_dropped: AtomicU64::new(0),
            last_tick: RwLock::new(None),
            start_time: Instant::now(),
        }
    }

    pub fn role(&self, role: Role) -> &RoleCounters {
        match role {
            Role::Service => &self.service,
            Role::Supervisor => &self.supervisor,
        }
    }

    /// Records a completed tick.
    pub fn record_tick(&self, duration_seconds: f64, success: bool) {
        self.ticks_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.tick_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.tick_duration_seconds.add_sample(duration_seconds);
        if let Ok(mut last) = self.last_tick.write() {
            *last = Some(Utc::now());
        }
    }

    pub fn last_tick(&self) -> Option<DateTime<Utc>> {
        self.last_tick.read().ok().and_then(|g| *g)
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Renders a plain-text table for the /health endpoint.
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let (last, avg, max, min, count) = self.tick_duration_seconds.snapshot();

        writeln!(out, "SAMPLER").ok();
        writeln!(out, "=======").ok();
        writeln!(out, "{:28} {:>12}", "ticks_total", self.ticks_total.load(Ordering::Relaxed)).ok();
        writeln!(out, "{:28} {:>12}", "tick_failures", self.tick_failures.load(Ordering::Relaxed)).ok();
        writeln!(out, "{:28} {:>12}", "subscribers_dropped", self.subscribers_dropped.load(Ordering::Relaxed)).ok();
        match self.last_tick() {
            Some(t) => writeln!(out, "{:28} {:>12}", "last_tick", t.format("%H:%M:%S")).ok(),
            None => writeln!(out, "{:28} {:>12}", "last_tick", "never").ok(),
        };
        writeln!(out).ok();
        writeln!(
            out,
            "{:28} | {:>10} | {:>10} | {:>10} | {:>10} | {:>8}",
            "tick duration (ms)", "last", "avg", "max", "min", "count"
        )
        .ok();
        writeln!(out, "{}", "-".repeat(86)).ok();
        writeln!(
            out,
            "{:28} | {:>10.2} | {:>10.2} | {:>10.2} | {:>10.2} | {:>8}",
            "",
            last * 1000.0,
            avg * 1000.0,
            max * 1000.0,
            min * 1000.0,
            count
        )
        .ok();
        writeln!(out).ok();

        writeln!(
            out,
            "{:12} | {:>10} | {:>14} | {:>10}",
            "role", "samples", "read failures", "unmatched"
        )
        .ok();
        writeln!(out, "{}", "-".repeat(56)).ok();
        for role in Role::ALL {
            let c = self.role(role);
            writeln!(
                out,
                "{:12} | {:>10} | {:>14} | {:>10}",
                role.as_str(),
                c.samples_appended.load(Ordering::Relaxed),
                c.read_failures.load(Ordering::Relaxed),
                c.unmatched_ticks.load(Ordering::Relaxed)
            )
            .ok();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stat() {
        let mut s = RunningStat::default();
        s.add(2.0);
        s.add(4.0);
        s.add(0.0);
        assert_eq!(s.avg(), 2.0);
        assert_eq!(s.min, 0.0);
        assert_eq!(s.max, 4.0);
        assert_eq!(s.last, 0.0);
    }

    #[test]
    fn test_record_tick_counts_failures() {
        let h = HealthStats::new();
        assert!(h.last_tick().is_none());
        h.record_tick(0.01, true);
        h.record_tick(0.02, false);
        assert_eq!(h.ticks_total.load(Ordering::Relaxed), 2);
        assert_eq!(h.tick_failures.load(Ordering::Relaxed), 1);
        assert!(h.last_tick().is_some());
        assert!(h.render_table().contains("supervisor"));
    }
}
