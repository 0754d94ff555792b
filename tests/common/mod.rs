//! Fake process source and usage reader for driving the monitor in tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use memwatch::config::{ConfigService, MonitorConfig};
use memwatch::monitor::Monitor;
use memwatch::process::{ProcessDescriptor, ProcessSource, ReadError, SourceError, Usage, UsageReader};

pub const SERVICE_CMD: &str = "/usr/bin/python3 -m pastewise.agent --background";
pub const SUPERVISOR_CMD: &str = "/usr/bin/pastewise-agent-menu";

pub fn desc(pid: u32, cmdline: &str) -> ProcessDescriptor {
    ProcessDescriptor {
        pid,
        cmdline: cmdline.to_string(),
        ppid: 1,
    }
}

#[derive(Default)]
pub struct FakeSource {
    pub procs: Mutex<Vec<ProcessDescriptor>>,
    pub fail: AtomicBool,
    pub panic: AtomicBool,
    pub hang: Mutex<Option<Duration>>,
    pub calls: AtomicUsize,
}

impl FakeSource {
    pub fn with(procs: Vec<ProcessDescriptor>) -> Arc<Self> {
        Arc::new(Self {
            procs: Mutex::new(procs),
            ..Default::default()
        })
    }

    pub fn set(&self, procs: Vec<ProcessDescriptor>) {
        *self.procs.lock().unwrap() = procs;
    }
}

impl ProcessSource for FakeSource {
    fn snapshot(&self) -> Result<Vec<ProcessDescriptor>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let hang = *self.hang.lock().unwrap();
        if let Some(d) = hang {
            std::thread::sleep(d);
        }
        if self.panic.load(Ordering::SeqCst) {
            panic!("fake source exploded");
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(SourceError(std::io::Error::other("proc unavailable")));
        }
        Ok(self.procs.lock().unwrap().clone())
    }
}

/// How a fake read behaves for a pid.
#[derive(Clone)]
pub enum Behaviour {
    Memory(u64),
    Fail,
    Panic,
    Hang(Duration),
}

#[derive(Default)]
pub struct FakeReader {
    pub pids: Mutex<HashMap<u32, Behaviour>>,
    pub calls: Mutex<HashMap<u32, usize>>,
}

impl FakeReader {
    pub fn with(entries: &[(u32, Behaviour)]) -> Arc<Self> {
        Arc::new(Self {
            pids: Mutex::new(entries.iter().cloned().collect()),
            ..Default::default()
        })
    }

    pub fn set(&self, pid: u32, behaviour: Behaviour) {
        self.pids.lock().unwrap().insert(pid, behaviour);
    }

    /// Reads started for `pid` so far.
    pub fn calls(&self, pid: u32) -> usize {
        self.calls.lock().unwrap().get(&pid).copied().unwrap_or(0)
    }
}

impl UsageReader for FakeReader {
    fn read(&self, pid: u32) -> Result<Usage, ReadError> {
        *self.calls.lock().unwrap().entry(pid).or_insert(0) += 1;
        let behaviour = self.pids.lock().unwrap().get(&pid).cloned();
        match behaviour {
            Some(Behaviour::Memory(memory_bytes)) => Ok(Usage {
                memory_bytes,
                cpu_percent: Some(1.5),
            }),
            Some(Behaviour::Fail) => Err(ReadError::PermissionDenied(pid)),
            Some(Behaviour::Panic) => panic!("fake reader exploded"),
            Some(Behaviour::Hang(d)) => {
                std::thread::sleep(d);
                Ok(Usage {
                    memory_bytes: 1,
                    cpu_percent: None,
                })
            }
            None => Err(ReadError::NotFound(pid)),
        }
    }
}

pub fn fast_config() -> MonitorConfig {
    let mut cfg = MonitorConfig::default();
    cfg.sampling.interval_ms = 10;
    cfg.sampling.read_timeout_ms = 200;
    cfg
}

pub fn monitor_with(
    config: MonitorConfig,
    source: Arc<FakeSource>,
    reader: Arc<FakeReader>,
) -> Monitor {
    let config = Arc::new(ConfigService::from_config(config).unwrap());
    Monitor::new(config, source, reader)
}

/// Both roles present with fixed memory.
pub fn healthy_pair() -> (Arc<FakeSource>, Arc<FakeReader>) {
    let source = FakeSource::with(vec![desc(100, SERVICE_CMD), desc(200, SUPERVISOR_CMD), desc(300, "/usr/sbin/sshd")]);
    let reader = FakeReader::with(&[
        (100, Behaviour::Memory(40 * 1024 * 1024)),
        (200, Behaviour::Memory(12 * 1024 * 1024)),
    ]);
    (source, reader)
}
