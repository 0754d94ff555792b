//! Memory trend analysis and leak classification.
//!
//! Fits a least-squares line of memory over time on a short and a long
//! window. The short window drives classification. A leak is reported only
//! after the short-window slope has stayed above the growth threshold for
//! `leak_debounce_cycles` consecutive evaluations, each evaluation being the
//! window ending at one of the newest samples. Because the streak is derived
//! from the retained samples, the verdict is always reproducible from the
//! history alone.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;

use crate::config::{ConfigService, TrendConfig};
use crate::history::{HistoryStore, Window};
use crate::roles::{Role, Sample};

/// Heuristic verdict for a role's memory behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Not enough samples to say anything.
    Unknown,
    Stable,
    Growing,
    Leaking,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Unknown => "unknown",
            Classification::Stable => "stable",
            Classification::Growing => "growing",
            Classification::Leaking => "leaking",
        }
    }

    /// Numeric level used by the metrics endpoint.
    pub fn level(&self) -> f64 {
        match self {
            Classification::Unknown => -1.0,
            Classification::Stable => 0.0,
            Classification::Growing => 1.0,
            Classification::Leaking => 2.0,
        }
    }
}

/// Fit of one analysis window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowStats {
    pub samples: usize,
    pub span_secs: f64,
    pub mean_bytes: f64,
    pub min_bytes: u64,
    pub max_bytes: u64,
    pub slope_bytes_per_sec: f64,
    pub r_squared: f64,
}

/// Derived trend state for a role.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendState {
    pub classification: Classification,
    /// 0.0 to 1.0, from sample population and goodness of fit.
    pub confidence: f64,
    /// Short-window mean, the "windowed mean" for the role.
    pub mean_bytes: Option<f64>,
    /// Short-window slope in bytes per second.
    pub slope_bytes_per_sec: Option<f64>,
    /// Consecutive growing evaluations ending at the newest sample.
    pub growing_streak: usize,
    pub short_window: Option<WindowStats>,
    pub long_window: Option<WindowStats>,
}

impl TrendState {
    pub fn unknown() -> Self {
        Self {
            classification: Classification::Unknown,
            confidence: 0.0,
            mean_bytes: None,
            slope_bytes_per_sec: None,
            growing_streak: 0,
            short_window: None,
            long_window: None,
        }
    }
}

/// Least-squares fit over `samples` (already time-ordered).
///
/// Returns `None` for fewer than `min_samples` samples.
pub fn fit_window(samples: &[Sample], min_samples: usize) -> Option<WindowStats> {
    if samples.len() < min_samples.max(2) {
        return None;
    }

    let n = samples.len() as f64;
    // Normalize timestamps to avoid precision issues
    let t0 = samples[0].monotonic_secs;

    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_xx = 0.0;
    let mut min_bytes = u64::MAX;
    let mut max_bytes = 0;

    for s in samples {
        let x = s.monotonic_secs - t0;
        let y = s.memory_bytes as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
        min_bytes = min_bytes.min(s.memory_bytes);
        max_bytes = max_bytes.max(s.memory_bytes);
    }

    let denominator = n * sum_xx - sum_x * sum_x;
    let slope = if denominator.abs() < f64::EPSILON {
        0.0
    } else {
        (n * sum_xy - sum_x * sum_y) / denominator
    };

    let mean_x = sum_x / n;
    let mean_y = sum_y / n;
    let intercept = mean_y - slope * mean_x;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for s in samples {
        let x = s.monotonic_secs - t0;
        let y = s.memory_bytes as f64;
        ss_res += (y - (slope * x + intercept)).powi(2);
        ss_tot += (y - mean_y).powi(2);
    }
    let r_squared = if ss_tot.abs() < f64::EPSILON {
        0.0
    } else {
        (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
    };

    Some(WindowStats {
        samples: samples.len(),
        span_secs: samples[samples.len() - 1].monotonic_secs - t0,
        mean_bytes: mean_y,
        min_bytes,
        max_bytes,
        slope_bytes_per_sec: slope,
        r_squared,
    })
}

/// Samples within `secs` of the sample at `end` (inclusive), in order.
fn window_ending_at(samples: &[Sample], end: usize, secs: f64) -> &[Sample] {
    let newest = samples[end].monotonic_secs;
    let cutoff = newest - secs;
    let start = samples[..=end].partition_point(|s| s.monotonic_secs < cutoff);
    &samples[start..=end]
}

fn population_factor(stats: &WindowStats, cfg: &TrendConfig) -> f64 {
    (stats.samples as f64 / cfg.confident_sample_count as f64).min(1.0)
}

/// True when the window is confidently above the growth threshold.
fn is_growing(stats: &WindowStats, cfg: &TrendConfig) -> bool {
    stats.slope_bytes_per_sec > cfg.growth_threshold_bytes_per_sec
        && population_factor(stats, cfg) * stats.r_squared >= cfg.min_confidence
}

/// Computes the trend state from a role's full retained history.
///
/// `samples` must be the chronologically ordered history of one role.
pub fn analyze(samples: &[Sample], cfg: &TrendConfig) -> TrendState {
    if samples.is_empty() {
        return TrendState::unknown();
    }
    let last = samples.len() - 1;
    let short_secs = cfg.short_window_secs as f64;

    let Some(short) = fit_window(window_ending_at(samples, last, short_secs), cfg.min_samples)
    else {
        return TrendState::unknown();
    };
    let long = fit_window(
        window_ending_at(samples, last, cfg.long_window_secs as f64),
        cfg.min_samples,
    );

    // Walk back over the newest evaluations until one is not growing.
    let mut streak = 0;
    for end in (0..=last).rev().take(cfg.leak_debounce_cycles) {
        match fit_window(window_ending_at(samples, end, short_secs), cfg.min_samples) {
            Some(stats) if is_growing(&stats, cfg) => streak += 1,
            _ => break,
        }
    }

    let population = population_factor(&short, cfg);
    let (classification, confidence) = if streak == 0 {
        // Below threshold, or above it with too little support: report stable
        // with whatever confidence the data gives.
        if short.slope_bytes_per_sec > cfg.growth_threshold_bytes_per_sec {
            (Classification::Stable, population * short.r_squared)
        } else {
            (Classification::Stable, population)
        }
    } else if streak >= cfg.leak_debounce_cycles {
        (Classification::Leaking, population * short.r_squared)
    } else {
        (Classification::Growing, population * short.r_squared)
    };

    TrendState {
        classification,
        confidence,
        mean_bytes: Some(short.mean_bytes),
        slope_bytes_per_sec: Some(short.slope_bytes_per_sec),
        growing_streak: streak,
        short_window: Some(short),
        long_window: long,
    }
}

/// Caches the latest trend state per role.
pub struct TrendAnalyzer {
    store: Arc<HistoryStore>,
    config: Arc<ConfigService>,
    states: DashMap<Role, TrendState>,
}

impl TrendAnalyzer {
    pub fn new(store: Arc<HistoryStore>, config: Arc<ConfigService>) -> Self {
        Self {
            store,
            config,
            states: DashMap::new(),
        }
    }

    /// Recomputes the role's state from its current history.
    pub fn update(&self, role: Role) -> TrendState {
        let cfg = self.config.current();
        let samples = self.store.range(role, Window::All);
        let state = analyze(&samples, &cfg.config.trend);
        self.states.insert(role, state.clone());
        state
    }

    /// Last computed state, or `unknown` if the role was never updated.
    pub fn current(&self, role: Role) -> TrendState {
        self.states
            .get(&role)
            .map(|s| s.clone())
            .unwrap_or_else(TrendState::unknown)
    }

    pub fn clear(&self) {
        self.states.clear();
    }
}
