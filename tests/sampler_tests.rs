//! Integration tests for the sampling loop, driven by fake process sources.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::*;
use memwatch::history::Window;
use memwatch::hub::{MessageKind, RoleFilter};
use memwatch::query::Availability;
use memwatch::roles::Role;
use memwatch::sampler::ProcessStatus;

#[tokio::test]
async fn test_tick_samples_both_roles() {
    let (source, reader) = healthy_pair();
    let monitor = monitor_with(fast_config(), source, reader);

    let report = monitor.sampler().tick().await.unwrap();
    assert_eq!(report.processes_seen, 3);
    assert_eq!(report.sampled, vec![Role::Service, Role::Supervisor]);

    let query = monitor.query();
    let service = query.history(Role::Service, Window::All);
    assert_eq!(service.samples.len(), 1);
    assert_eq!(service.samples[0].pid, 100);
    assert_eq!(service.samples[0].memory_bytes, 40 * 1024 * 1024);
    assert_eq!(service.status, Availability::Available);

    let inventory = query.process_inventory();
    assert_eq!(inventory.tick, 1);
    let sup = inventory.entry(Role::Supervisor).unwrap();
    assert_eq!(sup.status, ProcessStatus::Sampled);
    assert_eq!(sup.pid, Some(200));
}

#[tokio::test]
async fn test_absent_role_gets_no_synthetic_sample() {
    let source = FakeSource::with(vec![desc(100, SERVICE_CMD)]);
    let reader = FakeReader::with(&[(100, Behaviour::Memory(1 << 20))]);
    let monitor = monitor_with(fast_config(), source, reader);

    for _ in 0..3 {
        monitor.sampler().tick().await.unwrap();
    }

    assert_eq!(monitor.store.len(Role::Service), 3);
    assert_eq!(monitor.store.len(Role::Supervisor), 0);

    let snap = monitor.query().snapshot();
    let sup = &snap[&Role::Supervisor];
    assert_eq!(sup.status, Availability::Unavailable);
    assert!(sup.latest.is_none());
    assert_eq!(
        monitor.health.supervisor.unmatched_ticks.load(Ordering::Relaxed),
        3
    );
}

#[tokio::test]
async fn test_read_failure_skips_only_that_role() {
    let (source, reader) = healthy_pair();
    reader.set(100, Behaviour::Fail);
    let monitor = monitor_with(fast_config(), source, reader);

    let report = monitor.sampler().tick().await.unwrap();
    assert_eq!(report.failed, vec![Role::Service]);
    assert_eq!(report.sampled, vec![Role::Supervisor]);
    assert_eq!(monitor.store.len(Role::Service), 0);
    assert_eq!(monitor.health.service.read_failures.load(Ordering::Relaxed), 1);

    let inventory = monitor.query().process_inventory();
    let svc = inventory.entry(Role::Service).unwrap();
    assert_eq!(svc.status, ProcessStatus::ReadFailed);
    assert!(svc.error.as_deref().unwrap().contains("100"));
}

#[tokio::test]
async fn test_reader_panic_is_contained() {
    let (source, reader) = healthy_pair();
    reader.set(200, Behaviour::Panic);
    let monitor = monitor_with(fast_config(), source, reader);

    monitor.sampler().run_one_tick().await;
    assert_eq!(monitor.health.ticks_total.load(Ordering::Relaxed), 1);
    assert_eq!(monitor.store.len(Role::Service), 1);
    assert_eq!(monitor.store.len(Role::Supervisor), 0);
}

#[tokio::test]
async fn test_slow_read_times_out() {
    let (source, reader) = healthy_pair();
    reader.set(100, Behaviour::Hang(Duration::from_millis(300)));
    let mut cfg = fast_config();
    cfg.sampling.read_timeout_ms = 20;
    let monitor = monitor_with(cfg, source, reader);

    let report = monitor.sampler().tick().await.unwrap();
    assert_eq!(report.failed, vec![Role::Service]);
    let inventory = monitor.query().process_inventory();
    let err = inventory.entry(Role::Service).unwrap().error.clone().unwrap();
    assert!(err.contains("timed out"), "{}", err);
}

#[tokio::test]
async fn test_source_failure_fails_tick_and_loop_recovers() {
    let (source, reader) = healthy_pair();
    let monitor = monitor_with(fast_config(), source.clone(), reader);

    source.fail.store(true, Ordering::SeqCst);
    monitor.sampler().run_one_tick().await;
    source.fail.store(false, Ordering::SeqCst);
    source.panic.store(true, Ordering::SeqCst);
    monitor.sampler().run_one_tick().await;
    source.panic.store(false, Ordering::SeqCst);
    monitor.sampler().run_one_tick().await;

    assert_eq!(monitor.health.ticks_total.load(Ordering::Relaxed), 3);
    assert_eq!(monitor.health.tick_failures.load(Ordering::Relaxed), 2);
    assert_eq!(monitor.store.len(Role::Service), 1);
}

#[tokio::test]
async fn test_lowest_pid_wins_and_matched_since_tracks_pid() {
    let source = FakeSource::with(vec![
        desc(510, SERVICE_CMD),
        desc(505, SERVICE_CMD),
        desc(600, SUPERVISOR_CMD),
    ]);
    let reader = FakeReader::with(&[
        (505, Behaviour::Memory(5)),
        (510, Behaviour::Memory(10)),
        (600, Behaviour::Memory(6)),
        (700, Behaviour::Memory(7)),
    ]);
    let monitor = monitor_with(fast_config(), source.clone(), reader);

    monitor.sampler().tick().await.unwrap();
    let first = monitor.query().process_inventory();
    let svc = first.entry(Role::Service).unwrap();
    assert_eq!(svc.pid, Some(505));
    assert_eq!(svc.candidates, 2);
    let since = first.entry(Role::Supervisor).unwrap().matched_since.unwrap();

    monitor.sampler().tick().await.unwrap();
    let second = monitor.query().process_inventory();
    assert_eq!(second.entry(Role::Supervisor).unwrap().matched_since, Some(since));

    // Supervisor restarted under a new pid.
    source.set(vec![desc(505, SERVICE_CMD), desc(700, SUPERVISOR_CMD)]);
    tokio::time::sleep(Duration::from_millis(5)).await;
    monitor.sampler().tick().await.unwrap();
    let third = monitor.query().process_inventory();
    let sup = third.entry(Role::Supervisor).unwrap();
    assert_eq!(sup.pid, Some(700));
    assert!(sup.matched_since.unwrap() > since);
}

#[tokio::test]
async fn test_history_timestamps_strictly_increase() {
    let (source, reader) = healthy_pair();
    let monitor = monitor_with(fast_config(), source, reader);
    for _ in 0..5 {
        monitor.sampler().tick().await.unwrap();
    }
    let samples = monitor.store.range(Role::Service, Window::All);
    assert_eq!(samples.len(), 5);
    assert!(samples
        .windows(2)
        .all(|w| w[0].monotonic_secs < w[1].monotonic_secs));
}

#[tokio::test]
async fn test_capacity_change_applies_on_next_tick() {
    let (source, reader) = healthy_pair();
    let mut cfg = fast_config();
    cfg.history.capacity = 4;
    let monitor = monitor_with(cfg.clone(), source, reader);

    for _ in 0..6 {
        monitor.sampler().tick().await.unwrap();
    }
    assert_eq!(monitor.store.len(Role::Service), 4);

    cfg.history.capacity = 2;
    monitor.config.persist(cfg).unwrap();
    monitor.sampler().tick().await.unwrap();
    assert_eq!(monitor.store.len(Role::Service), 2);
    assert_eq!(monitor.store.get_stats().capacity, 2);
}

#[tokio::test]
async fn test_subscriber_sees_snapshot_then_deltas() {
    let (source, reader) = healthy_pair();
    let monitor = monitor_with(fast_config(), source, reader);
    monitor.sampler().tick().await.unwrap();

    let mut sub = monitor.subscribe(RoleFilter::Only(Role::Service));
    let first = sub.try_recv().unwrap();
    assert_eq!(first.kind, MessageKind::Snapshot);
    assert_eq!(first.role, Role::Service);
    assert!(sub.try_recv().is_none());

    monitor.sampler().tick().await.unwrap();
    let delta = sub.try_recv().unwrap();
    assert_eq!(delta.kind, MessageKind::Delta);
    assert!(delta.monotonic_secs > first.monotonic_secs);
}

#[tokio::test]
async fn test_start_and_stop_lifecycle() {
    let (source, reader) = healthy_pair();
    let monitor = monitor_with(fast_config(), source, reader);
    let mut sub = monitor.subscribe(RoleFilter::All);

    monitor.start();
    assert!(monitor.is_running());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while monitor.health.ticks_total.load(Ordering::Relaxed) < 3 {
        assert!(tokio::time::Instant::now() < deadline, "sampler never ticked");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    monitor.stop().await;
    assert!(!monitor.is_running());
    assert_eq!(monitor.store.len(Role::Service), 0);
    assert_eq!(monitor.hub.subscriber_count(), 0);

    // Drain whatever was queued; the channel then reports closed.
    while sub.recv().await.is_some() {}
}

/// Small blocking pool so that leaked blocking threads would show quickly.
fn small_pool_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .max_blocking_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

#[test]
fn test_hung_read_pins_one_thread_and_other_role_keeps_sampling() {
    let rt = small_pool_runtime();
    let (source, reader) = healthy_pair();
    reader.set(100, Behaviour::Hang(Duration::from_secs(5)));
    let mut cfg = fast_config();
    cfg.sampling.read_timeout_ms = 20;
    let monitor = monitor_with(cfg, source, reader.clone());

    rt.block_on(async {
        for tick in 0..12 {
            let report = monitor.sampler().tick().await.unwrap();
            assert_eq!(report.sampled, vec![Role::Supervisor], "tick {}", tick);
            assert_eq!(report.failed, vec![Role::Service], "tick {}", tick);
        }
    });

    // Only the first hung read was ever started.
    assert_eq!(reader.calls(100), 1);
    assert_eq!(reader.calls(200), 12);
    assert_eq!(monitor.sampler().reads_in_flight(), 1);
    assert_eq!(monitor.store.len(Role::Supervisor), 12);

    let inventory = monitor.query().process_inventory();
    let err = inventory.entry(Role::Service).unwrap().error.clone().unwrap();
    assert!(err.contains("timed out"), "{}", err);

    rt.shutdown_background();
}

#[test]
fn test_hung_enumeration_is_not_started_again() {
    let rt = small_pool_runtime();
    let (source, reader) = healthy_pair();
    let mut cfg = fast_config();
    cfg.sampling.read_timeout_ms = 20;
    let monitor = monitor_with(cfg, source.clone(), reader);

    rt.block_on(async {
        monitor.sampler().tick().await.unwrap();

        *source.hang.lock().unwrap() = Some(Duration::from_secs(5));
        for _ in 0..8 {
            monitor.sampler().run_one_tick().await;
        }
    });

    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    assert_eq!(monitor.health.tick_failures.load(Ordering::Relaxed), 8);
    assert_eq!(monitor.store.len(Role::Service), 1);

    rt.shutdown_background();
}

#[tokio::test]
async fn test_no_samples_recorded_after_stop() {
    let (source, reader) = healthy_pair();
    let monitor = monitor_with(fast_config(), source, reader);

    monitor.start();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while monitor.store.len(Role::Service) == 0 {
        assert!(tokio::time::Instant::now() < deadline, "sampler never ticked");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    monitor.stop().await;

    // A tick that outlived the loop discards its results.
    let report = monitor.sampler().tick().await.unwrap();
    assert!(report.sampled.is_empty());
    assert_eq!(monitor.store.len(Role::Service), 0);
    assert_eq!(monitor.store.len(Role::Supervisor), 0);

    // Starting again records as before.
    monitor.start();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while monitor.store.len(Role::Service) == 0 {
        assert!(tokio::time::Instant::now() < deadline, "sampler did not resume");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    monitor.stop().await;
}
