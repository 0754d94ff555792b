//! Health check endpoint handler.
//!
//! This module provides the `/health` endpoint handler that returns sampler
//! health statistics as a plain-text table.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::fmt::Write as FmtWrite;
use std::sync::atomic::Ordering;
use tracing::{debug, instrument};

use crate::state::SharedState;

// Time conversion constants
const SECONDS_PER_HOUR: f64 = 3600.0;
const MINUTES_PER_HOUR: f64 = 60.0;
const HOURS_PER_DAY: f64 = 24.0;

fn format_uptime(uptime_seconds: u64) -> String {
    let uptime_hours = uptime_seconds as f64 / SECONDS_PER_HOUR;
    if uptime_hours < 1.0 {
        format!("{:.1} minutes", uptime_hours * MINUTES_PER_HOUR)
    } else if uptime_hours < HOURS_PER_DAY {
        format!("{:.1} hours", uptime_hours)
    } else {
        format!("{:.1} days", uptime_hours / HOURS_PER_DAY)
    }
}

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");

    let health = &state.monitor.health;
    let ticks = health.ticks_total.load(Ordering::Relaxed);

    // Unhealthy until the sampler has completed a tick.
    let (status, message) = if ticks == 0 {
        (StatusCode::SERVICE_UNAVAILABLE, "Waiting for first tick")
    } else if state.monitor.is_running() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Sampler stopped")
    };

    let mut roles = String::new();
    writeln!(roles, "ROLES").ok();
    writeln!(roles, "=====").ok();
    for (role, snap) in state.query.snapshot() {
        writeln!(
            roles,
            "{:12} {:>12} {:>10} confidence {:.2}",
            role.as_str(),
            format!("{:?}", snap.status).to_lowercase(),
            snap.trend.classification.as_str(),
            snap.trend.confidence
        )
        .ok();
    }

    let uptime_str = format_uptime(health.get_uptime_seconds());
    let table = health.render_table();

    debug!("Health check: {} - {}", status, message);
    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!("{message}\n\nUptime: {uptime_str}\n\n{table}\n{roles}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(90), "1.5 minutes");
        assert_eq!(format_uptime(7200), "2.0 hours");
        assert_eq!(format_uptime(172_800), "2.0 days");
    }
}
