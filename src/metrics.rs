//! Prometheus metrics for memwatch.
//!
//! Values are copied from the monitor at scrape time; nothing here is updated
//! on the sampling path.

use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::health_stats::HealthStats;
use crate::history::HistoryStore;
use crate::hub::PublishHub;
use crate::query::{Availability, QueryApi};
use crate::roles::Role;

/// Buffer capacity for metrics encoding.
const BUFFER_CAP: usize = 16 * 1024;

/// Collection of Prometheus metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    registry: Registry,

    // ========== Per-role Metrics ==========
    pub role_memory_bytes: GaugeVec,     // labels: role
    pub role_cpu_percent: GaugeVec,      // labels: role
    pub role_available: GaugeVec,        // labels: role
    pub role_trend_slope: GaugeVec,      // labels: role
    pub role_trend_confidence: GaugeVec, // labels: role
    pub role_trend_level: GaugeVec,      // labels: role
    pub role_history_samples: GaugeVec,  // labels: role
    pub role_read_failures: GaugeVec,    // labels: role

    // ========== Sampler Metrics ==========
    pub ticks_total: Gauge,
    pub tick_failures_total: Gauge,
    pub tick_duration_seconds: Gauge,
    pub history_capacity: Gauge,

    // ========== Push Channel Metrics ==========
    pub subscribers: Gauge,
    pub subscribers_dropped_total: Gauge,
}

fn role_gauge(name: &str, help: &str) -> Result<GaugeVec, prometheus::Error> {
    GaugeVec::new(Opts::new(name, help), &["role"])
}

impl MonitorMetrics {
    /// Creates and registers all metrics with a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let role_memory_bytes = role_gauge(
            "memwatch_role_memory_bytes",
            "Resident memory of the process holding the role, in bytes",
        )?;
        let role_cpu_percent = role_gauge(
            "memwatch_role_cpu_percent",
            "CPU usage of the process holding the role, in percent of one core",
        )?;
        let role_available = role_gauge(
            "memwatch_role_available",
            "1 if the role was sampled in the latest tick, 0 otherwise",
        )?;
        let role_trend_slope = role_gauge(
            "memwatch_role_trend_slope_bytes_per_second",
            "Short-window memory slope in bytes per second",
        )?;
        let role_trend_confidence = role_gauge(
            "memwatch_role_trend_confidence",
            "Confidence of the trend classification (0.0-1.0)",
        )?;
        let role_trend_level = role_gauge(
            "memwatch_role_trend_level",
            "Trend classification: -1 unknown, 0 stable, 1 growing, 2 leaking",
        )?;
        let role_history_samples = role_gauge(
            "memwatch_role_history_samples",
            "Samples currently retained for the role",
        )?;
        let role_read_failures = role_gauge(
            "memwatch_role_read_failures_total",
            "Failed usage reads for the role since start",
        )?;

        let ticks_total = Gauge::new("memwatch_ticks_total", "Sampler ticks since start")?;
        let tick_failures_total = Gauge::new(
            "memwatch_tick_failures_total",
            "Sampler ticks that failed or panicked",
        )?;
        let tick_duration_seconds = Gauge::new(
            "memwatch_tick_duration_seconds",
            "Duration of the most recent tick in seconds",
        )?;
        let history_capacity = Gauge::new(
            "memwatch_history_capacity",
            "Samples retained per role",
        )?;
        let subscribers = Gauge::new("memwatch_subscribers", "Connected push subscribers")?;
        let subscribers_dropped_total = Gauge::new(
            "memwatch_subscribers_dropped_total",
            "Push subscribers disconnected because their queue overflowed",
        )?;

        registry.register(Box::new(role_memory_bytes.clone()))?;
        registry.register(Box::new(role_cpu_percent.clone()))?;
        registry.register(Box::new(role_available.clone()))?;
        registry.register(Box::new(role_trend_slope.clone()))?;
        registry.register(Box::new(role_trend_confidence.clone()))?;
        registry.register(Box::new(role_trend_level.clone()))?;
        registry.register(Box::new(role_history_samples.clone()))?;
        registry.register(Box::new(role_read_failures.clone()))?;
        registry.register(Box::new(ticks_total.clone()))?;
        registry.register(Box::new(tick_failures_total.clone()))?;
        registry.register(Box::new(tick_duration_seconds.clone()))?;
        registry.register(Box::new(history_capacity.clone()))?;
        registry.register(Box::new(subscribers.clone()))?;
        registry.register(Box::new(subscribers_dropped_total.clone()))?;

        Ok(Self {
            registry,
            role_memory_bytes,
            role_cpu_percent,
            role_available,
            role_trend_slope,
            role_trend_confidence,
            role_trend_level,
            role_history_samples,
            role_read_failures,
            ticks_total,
            tick_failures_total,
            tick_duration_seconds,
            history_capacity,
            subscribers,
            subscribers_dropped_total,
        })
    }

    /// Copies current monitor state into the gauges.
    pub fn refresh(
        &self,
        query: &QueryApi,
        store: &Arc<HistoryStore>,
        health: &HealthStats,
        hub: &PublishHub,
    ) {
        let snapshot = query.snapshot();
        let stats = store.get_stats();

        for role in Role::ALL {
            let label = [role.as_str()];
            let counters = health.role(role);
            self.role_read_failures
                .with_label_values(&label)
                .set(counters.read_failures.load(Ordering::Relaxed) as f64);
            self.role_history_samples
                .with_label_values(&label)
                .set(store.len(role) as f64);

            let Some(snap) = snapshot.get(&role) else {
                continue;
            };
            let available = snap.status == Availability::Available;
            self.role_available
                .with_label_values(&label)
                .set(if available { 1.0 } else { 0.0 });
            self.role_trend_level
                .with_label_values(&label)
                .set(snap.trend.classification.level());
            self.role_trend_confidence
                .with_label_values(&label)
                .set(snap.trend.confidence);
            match snap.trend.slope_bytes_per_sec {
                Some(slope) => self.role_trend_slope.with_label_values(&label).set(slope),
                None => {
                    let _ = self.role_trend_slope.remove_label_values(&label);
                }
            }

            // Unavailable roles export no usage rather than a stale or zero value.
            match (&snap.latest, available) {
                (Some(sample), true) => {
                    self.role_memory_bytes
                        .with_label_values(&label)
                        .set(sample.memory_bytes as f64);
                    match sample.cpu_percent {
                        Some(cpu) => self.role_cpu_percent.with_label_values(&label).set(cpu),
                        None => {
                            let _ = self.role_cpu_percent.remove_label_values(&label);
                        }
                    }
                }
                _ => {
                    let _ = self.role_memory_bytes.remove_label_values(&label);
                    let _ = self.role_cpu_percent.remove_label_values(&label);
                }
            }
        }

        let (last, ..) = health.tick_duration_seconds.snapshot();
        self.ticks_total
            .set(health.ticks_total.load(Ordering::Relaxed) as f64);
        self.tick_failures_total
            .set(health.tick_failures.load(Ordering::Relaxed) as f64);
        self.tick_duration_seconds.set(last);
        self.history_capacity.set(stats.capacity as f64);
        self.subscribers.set(hub.subscriber_count() as f64);
        self.subscribers_dropped_total
            .set(hub.dropped_total() as f64);
    }

    /// Encodes the registry in Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let families = self.registry.gather();
        let mut buffer = Vec::with_capacity(BUFFER_CAP);
        TextEncoder::new().encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
