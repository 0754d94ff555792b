//! Periodic sampling loop.
//!
//! Each tick enumerates processes, classifies them, reads memory/CPU for one
//! process per role and records the resulting samples. The sampler is the
//! only writer of the history store and the only caller of trend updates and
//! broadcasts.
//!
//! A tick never produces a placeholder sample: a role with no matching
//! process or a failed read simply gets no sample that tick. Any error or
//! panic inside a tick is logged and the loop carries on with the next one.
//!
//! Blocking reads cannot be cancelled, only abandoned. A pid whose previous
//! read has not returned yet is not read again, and neither is the process
//! list, so a hung read pins at most one blocking thread.

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinSet};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::ConfigService;
use crate::health_stats::HealthStats;
use crate::history::HistoryStore;
use crate::hub::PublishHub;
use crate::process::{ProcessSource, ReadError, Usage, UsageReader};
use crate::roles::{Role, Sample};
use crate::trend::TrendAnalyzer;

/// Monotonic time base shared by all samples of one monitor.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    epoch: Instant,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Seconds since the epoch.
    pub fn now_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Holds a pid in the in-flight set until the blocking read returns.
struct ReadGuard {
    in_flight: Arc<DashMap<u32, ()>>,
    pid: u32,
}

impl ReadGuard {
    /// `None` while an earlier read of `pid` is still running.
    fn acquire(in_flight: &Arc<DashMap<u32, ()>>, pid: u32) -> Option<Self> {
        match in_flight.entry(pid) {
            dashmap::mapref::entry::Entry::Occupied(_) => None,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(());
                Some(Self {
                    in_flight: Arc::clone(in_flight),
                    pid,
                })
            }
        }
    }
}

impl Drop for ReadGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.pid);
    }
}

/// Set while a process enumeration is running on the blocking pool.
struct EnumerationGuard(Arc<AtomicBool>);

impl EnumerationGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for EnumerationGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Outcome for a role in the latest tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    /// A sample was recorded.
    Sampled,
    /// A process matched but its usage could not be read.
    ReadFailed,
    /// No process matched the role.
    Unmatched,
}

/// One row of the process inventory.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryEntry {
    pub role: Role,
    pub pid: Option<u32>,
    pub memory_bytes: Option<u64>,
    pub cpu_percent: Option<f64>,
    /// When this pid was first seen in this role without interruption.
    pub matched_since: Option<DateTime<Utc>>,
    pub status: ProcessStatus,
    /// Processes that matched the role; only the lowest pid is sampled.
    pub candidates: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Classification result of the most recent tick.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    pub tick: u64,
    pub taken_at: Option<DateTime<Utc>>,
    pub entries: Vec<InventoryEntry>,
}

impl Inventory {
    pub fn entry(&self, role: Role) -> Option<&InventoryEntry> {
        self.entries.iter().find(|e| e.role == role)
    }
}

/// Usage plus the monotonic and wall time it was read at.
type ReadOutcome = Result<(Usage, f64, DateTime<Utc>), ReadError>;

/// Shared slot holding the latest inventory.
pub type InventorySlot = Arc<RwLock<Arc<Inventory>>>;

/// Summary of one tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub processes_seen: usize,
    pub sampled: Vec<Role>,
    pub failed: Vec<Role>,
    pub unmatched: Vec<Role>,
    pub subscribers_dropped: usize,
}

/// Sampler state. Shared behind an `Arc` so each tick can run as its own task.
pub struct Sampler {
    config: Arc<ConfigService>,
    source: Arc<dyn ProcessSource>,
    reader: Arc<dyn UsageReader>,
    store: Arc<HistoryStore>,
    analyzer: Arc<TrendAnalyzer>,
    hub: Arc<PublishHub>,
    health: Arc<HealthStats>,
    inventory: InventorySlot,
    clock: Clock,
    matched_since: Mutex<BTreeMap<Role, (u32, DateTime<Utc>)>>,
    ticks: AtomicU64,
    reads_in_flight: Arc<DashMap<u32, ()>>,
    enumerating: Arc<AtomicBool>,
    /// Once set, ticks record nothing until `resume`.
    halted: AtomicBool,
    /// Held while a tick writes its results; `halt` waits on it.
    commit: Mutex<()>,
    current_tick: Mutex<Option<AbortHandle>>,
}

impl Sampler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<ConfigService>,
        source: Arc<dyn ProcessSource>,
        reader: Arc<dyn UsageReader>,
        store: Arc<HistoryStore>,
        analyzer: Arc<TrendAnalyzer>,
        hub: Arc<PublishHub>,
        health: Arc<HealthStats>,
        inventory: InventorySlot,
    ) -> Self {
        Self {
            config,
            source,
            reader,
            store,
            analyzer,
            hub,
            health,
            inventory,
            clock: Clock::new(),
            matched_since: Mutex::new(BTreeMap::new()),
            ticks: AtomicU64::new(0),
            reads_in_flight: Arc::new(DashMap::new()),
            enumerating: Arc::new(AtomicBool::new(false)),
            halted: AtomicBool::new(false),
            commit: Mutex::new(()),
            current_tick: Mutex::new(None),
        }
    }

    /// Stops recording. Aborts the tick task in flight, and returns only
    /// after any tick that is already writing its results has finished, so
    /// nothing reaches the history afterwards.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::Release);
        if let Some(task) = lock(&self.current_tick).take() {
            task.abort();
        }
        drop(lock(&self.commit));
    }

    /// Lets ticks record again after `halt`.
    pub fn resume(&self) {
        self.halted.store(false, Ordering::Release);
    }

    /// Number of usage reads that have not returned yet.
    pub fn reads_in_flight(&self) -> usize {
        self.reads_in_flight.len()
    }

    /// Runs until `shutdown` flips to true or its sender is dropped. A tick
    /// in progress always completes before the loop exits.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval_ms = self.config.current().config.sampling.interval_ms;
        info!(interval_ms, "Starting sampler loop");

        let mut ticker = interval(Duration::from_millis(interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Sampler loop stopping");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.run_one_tick().await;

                    let next_ms = self.config.current().config.sampling.interval_ms;
                    if next_ms != interval_ms {
                        info!(from = interval_ms, to = next_ms, "Sampling interval changed");
                        interval_ms = next_ms;
                        ticker = interval(Duration::from_millis(interval_ms));
                        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                        // A fresh interval fires immediately; consume that.
                        ticker.tick().await;
                    }
                }
            }
        }
    }

    /// Runs one tick in its own task so that a panic is contained.
    pub async fn run_one_tick(self: &Arc<Self>) {
        let start = Instant::now();
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.tick().await });
        *lock(&self.current_tick) = Some(handle.abort_handle());
        let outcome = handle.await;
        lock(&self.current_tick).take();
        let elapsed = start.elapsed().as_secs_f64();

        let success = match outcome {
            Ok(Ok(report)) => {
                debug!(
                    processes = report.processes_seen,
                    sampled = report.sampled.len(),
                    failed = report.failed.len(),
                    unmatched = report.unmatched.len(),
                    elapsed_ms = elapsed * 1000.0,
                    "Tick complete"
                );
                true
            }
            Ok(Err(e)) => {
                error!("Tick failed: {:#}", e);
                false
            }
            Err(join_err) if join_err.is_cancelled() => {
                debug!("Tick cancelled by stop");
                true
            }
            Err(join_err) => {
                error!("Tick aborted: {}", join_err);
                false
            }
        };
        self.health.record_tick(elapsed, success);
    }

    /// One sampling pass.
    pub async fn tick(&self) -> anyhow::Result<TickReport> {
        let active = self.config.current();
        let cfg = &active.config;
        self.store.ensure_capacity(cfg.history.capacity);

        let guard = EnumerationGuard::acquire(&self.enumerating)
            .ok_or_else(|| anyhow!("previous process enumeration has not returned yet"))?;
        let source = Arc::clone(&self.source);
        let processes = timeout(
            cfg.sampling.interval().max(cfg.sampling.read_timeout()),
            tokio::task::spawn_blocking(move || {
                let _guard = guard;
                source.snapshot()
            }),
        )
        .await
        .map_err(|_| anyhow!("process enumeration timed out"))?
        .context("process enumeration task failed")??;

        let roles = active.classifier.classify(&processes);

        // Lowest pid wins when several processes match one role.
        let mut chosen: BTreeMap<Role, (u32, usize)> = BTreeMap::new();
        for (&pid, &role) in roles.iter() {
            chosen
                .entry(role)
                .and_modify(|(best, count)| {
                    *best = (*best).min(pid);
                    *count += 1;
                })
                .or_insert((pid, 1));
        }

        let read_timeout = cfg.sampling.read_timeout();
        let mut reads: JoinSet<(Role, u32, ReadOutcome)> = JoinSet::new();
        for (&role, &(pid, _)) in chosen.iter() {
            let Some(guard) = ReadGuard::acquire(&self.reads_in_flight, pid) else {
                debug!(role = %role, pid, "Previous read still running, not starting another");
                reads.spawn(async move { (role, pid, Err(ReadError::Timeout(pid))) });
                continue;
            };
            let reader = Arc::clone(&self.reader);
            let clock = self.clock;
            reads.spawn(async move {
                let blocking = tokio::task::spawn_blocking(move || {
                    let _guard = guard;
                    let result = reader.read(pid);
                    (result, clock.now_secs(), Utc::now())
                });
                let outcome = match timeout(read_timeout, blocking).await {
                    Ok(Ok((result, mono, wall))) => result.map(|usage| (usage, mono, wall)),
                    Ok(Err(join_err)) => Err(ReadError::Other {
                        pid,
                        reason: format!("reader task failed: {}", join_err),
                    }),
                    Err(_) => Err(ReadError::Timeout(pid)),
                };
                (role, pid, outcome)
            });
        }

        let mut results: BTreeMap<Role, (u32, ReadOutcome)> = BTreeMap::new();
        while let Some(joined) = reads.join_next().await {
            match joined {
                Ok((role, pid, outcome)) => {
                    results.insert(role, (pid, outcome));
                }
                Err(e) => error!("Read task lost: {}", e),
            }
        }

        // No awaits past this point: the commit lock is a std mutex.
        let _commit = lock(&self.commit);
        if self.halted.load(Ordering::Acquire) {
            debug!("Sampler halted, discarding tick results");
            return Ok(TickReport {
                processes_seen: processes.len(),
                ..Default::default()
            });
        }

        let tick_no = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        let mut report = TickReport {
            processes_seen: processes.len(),
            ..Default::default()
        };
        let mut entries = Vec::with_capacity(Role::ALL.len());

        for role in Role::ALL {
            let counters = self.health.role(role);
            let candidates = chosen.get(&role).map(|(_, c)| *c).unwrap_or(0);
            let Some((pid, outcome)) = results.remove(&role) else {
                if candidates > 0 {
                    // The read task itself vanished; treat as a failed read.
                    counters.read_failures.fetch_add(1, Ordering::Relaxed);
                    report.failed.push(role);
                } else {
                    debug!(role = %role, "No process matches role this tick");
                    counters.unmatched_ticks.fetch_add(1, Ordering::Relaxed);
                    report.unmatched.push(role);
                }
                entries.push(InventoryEntry {
                    role,
                    pid: chosen.get(&role).map(|(p, _)| *p),
                    memory_bytes: None,
                    cpu_percent: None,
                    matched_since: None,
                    status: if candidates > 0 {
                        ProcessStatus::ReadFailed
                    } else {
                        ProcessStatus::Unmatched
                    },
                    candidates,
                    error: None,
                });
                continue;
            };
            let matched_since = self.matched_since_for(role, pid);

            match outcome {
                Ok((usage, mono, wall)) => {
                    let sample = Sample {
                        role,
                        pid,
                        monotonic_secs: mono,
                        timestamp: wall,
                        memory_bytes: usage.memory_bytes,
                        cpu_percent: usage.cpu_percent,
                    };
                    if let Err(e) = self.store.append(role, sample.clone()) {
                        warn!(role = %role, "Dropping sample: {}", e);
                        report.failed.push(role);
                        entries.push(InventoryEntry {
                            role,
                            pid: Some(pid),
                            memory_bytes: Some(usage.memory_bytes),
                            cpu_percent: usage.cpu_percent,
                            matched_since: Some(matched_since),
                            status: ProcessStatus::ReadFailed,
                            candidates,
                            error: Some(e.to_string()),
                        });
                        continue;
                    }
                    counters.samples_appended.fetch_add(1, Ordering::Relaxed);

                    let trend = self.analyzer.update(role);
                    let dropped = self.hub.broadcast(role, &sample, &trend);
                    if dropped > 0 {
                        self.health
                            .subscribers_dropped
                            .fetch_add(dropped as u64, Ordering::Relaxed);
                        report.subscribers_dropped += dropped;
                    }

                    report.sampled.push(role);
                    entries.push(InventoryEntry {
                        role,
                        pid: Some(pid),
                        memory_bytes: Some(usage.memory_bytes),
                        cpu_percent: usage.cpu_percent,
                        matched_since: Some(matched_since),
                        status: ProcessStatus::Sampled,
                        candidates,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(role = %role, pid, "Skipping role this tick: {}", e);
                    counters.read_failures.fetch_add(1, Ordering::Relaxed);
                    report.failed.push(role);
                    entries.push(InventoryEntry {
                        role,
                        pid: Some(pid),
                        memory_bytes: None,
                        cpu_percent: None,
                        matched_since: Some(matched_since),
                        status: ProcessStatus::ReadFailed,
                        candidates,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        self.forget_unmatched(&chosen);
        let inventory = Inventory {
            tick: tick_no,
            taken_at: Some(Utc::now()),
            entries,
        };
        match self.inventory.write() {
            Ok(mut slot) => *slot = Arc::new(inventory),
            Err(poisoned) => *poisoned.into_inner() = Arc::new(inventory),
        }

        Ok(report)
    }

    /// Returns when `pid` started holding `role`, resetting on a pid change.
    fn matched_since_for(&self, role: Role, pid: u32) -> DateTime<Utc> {
        let mut map = lock(&self.matched_since);
        let entry = map.entry(role).or_insert((pid, Utc::now()));
        if entry.0 != pid {
            *entry = (pid, Utc::now());
        }
        entry.1
    }

    fn forget_unmatched(&self, chosen: &BTreeMap<Role, (u32, usize)>) {
        let mut map = lock(&self.matched_since);
        map.retain(|role, _| chosen.contains_key(role));
    }
}
