//! Integration tests for the bounded per-role history.

use chrono::Utc;
use std::sync::Arc;
use std::thread;

use memwatch::history::{HistoryError, HistoryStore, Window};
use memwatch::roles::{Role, Sample};

fn sample(role: Role, t: f64, bytes: u64) -> Sample {
    Sample {
        role,
        pid: 1,
        monotonic_secs: t,
        timestamp: Utc::now(),
        memory_bytes: bytes,
        cpu_percent: Some(0.0),
    }
}

#[test]
fn test_capacity_bounds_retention() {
    let store = HistoryStore::new(50);
    for i in 0..500 {
        store.append(Role::Service, sample(Role::Service, i as f64, i)).unwrap();
        assert!(store.len(Role::Service) <= 50);
    }
    let all = store.range(Role::Service, Window::All);
    assert_eq!(all.len(), 50);
    assert_eq!(all.first().unwrap().memory_bytes, 450);
    assert_eq!(all.last().unwrap().memory_bytes, 499);
    assert_eq!(store.len(Role::Supervisor), 0);
}

#[test]
fn test_appended_samples_come_back_unchanged_in_order() {
    let store = HistoryStore::new(10);
    let input: Vec<Sample> = (0..7).map(|i| sample(Role::Supervisor, i as f64 * 0.5, 1000 + i)).collect();
    for s in &input {
        store.append(Role::Supervisor, s.clone()).unwrap();
    }
    assert_eq!(store.range(Role::Supervisor, Window::All), input);
    assert_eq!(store.latest(Role::Supervisor), input.last().cloned());
}

#[test]
fn test_windows_by_count_and_duration() {
    let store = HistoryStore::new(100);
    for i in 0..60 {
        store.append(Role::Service, sample(Role::Service, i as f64, i)).unwrap();
    }
    assert_eq!(store.range(Role::Service, Window::Count(5)).len(), 5);
    assert_eq!(store.range(Role::Service, Window::Count(500)).len(), 60);

    // Relative to the newest sample at t=59: t >= 49.
    let last_ten = store.range(Role::Service, Window::Seconds(10.0));
    assert_eq!(last_ten.len(), 11);
    assert_eq!(last_ten[0].monotonic_secs, 49.0);
    assert_eq!("10s".parse::<Window>().unwrap(), Window::Seconds(10.0));
    assert_eq!("2m".parse::<Window>().unwrap(), Window::Seconds(120.0));
    assert_eq!("15".parse::<Window>().unwrap(), Window::Count(15));
    assert_eq!("all".parse::<Window>().unwrap(), Window::All);
    assert!("ten".parse::<Window>().is_err());
}

#[test]
fn test_out_of_order_sample_rejected() {
    let store = HistoryStore::new(10);
    store.append(Role::Service, sample(Role::Service, 5.0, 1)).unwrap();
    let err = store.append(Role::Service, sample(Role::Service, 5.0, 2)).unwrap_err();
    assert!(matches!(err, HistoryError::OutOfOrder { .. }));
    let err = store.append(Role::Service, sample(Role::Supervisor, 6.0, 2)).unwrap_err();
    assert!(matches!(err, HistoryError::RoleMismatch { .. }));
    assert_eq!(store.len(Role::Service), 1);
}

#[test]
fn test_concurrent_readers_see_ordered_prefixes() {
    let store = Arc::new(HistoryStore::new(1000));
    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for i in 0..2000 {
                store.append(Role::Service, sample(Role::Service, i as f64, i)).unwrap();
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..200 {
                    let snap = store.range(Role::Service, Window::All);
                    assert!(snap.len() <= 1000);
                    assert!(snap.windows(2).all(|w| w[0].monotonic_secs < w[1].monotonic_secs));
                }
            })
        })
        .collect();
    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }
}
