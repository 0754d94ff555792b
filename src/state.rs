//! Application state shared by the HTTP handlers.

use std::sync::Arc;

use crate::config::ConfigService;
use crate::metrics::MonitorMetrics;
use crate::monitor::Monitor;
use crate::query::QueryApi;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests.
pub struct AppState {
    pub monitor: Arc<Monitor>,
    pub query: QueryApi,
    pub metrics: MonitorMetrics,
}

impl AppState {
    pub fn new(monitor: Arc<Monitor>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            query: monitor.query(),
            metrics: MonitorMetrics::new()?,
            monitor,
        })
    }

    pub fn config(&self) -> &Arc<ConfigService> {
        &self.monitor.config
    }
}
