//! memwatch library
//!
//! Memory telemetry and leak detection for a two-process application: a
//! background service and its user-facing supervisor. The monitor samples
//! each role on a fixed interval, keeps a bounded history, classifies the
//! memory trend, and serves the results over HTTP and a push channel.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use memwatch::config::{ConfigService, MonitorConfig};
//! use memwatch::monitor::Monitor;
//! use memwatch::process::{ProcScanner, ProcUsageReader};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(ConfigService::from_config(MonitorConfig::default())?);
//! let monitor = Monitor::new(
//!     config,
//!     Arc::new(ProcScanner::default()),
//!     Arc::new(ProcUsageReader::default()),
//! );
//! monitor.start();
//!
//! for (role, snap) in monitor.query().snapshot() {
//!     println!("{}: {:?} {}", role, snap.status, snap.trend.classification.as_str());
//! }
//!
//! monitor.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod handlers;
pub mod health_stats;
pub mod history;
pub mod hub;
pub mod metrics;
pub mod monitor;
pub mod process;
pub mod query;
pub mod ringbuffer;
pub mod roles;
pub mod sampler;
pub mod state;
pub mod trend;

// Re-export main types for convenience
pub use config::{ConfigError, ConfigService, MonitorConfig};
pub use history::{HistoryStore, Window};
pub use hub::{PublishHub, PushMessage, RoleFilter, Subscription};
pub use monitor::Monitor;
pub use query::QueryApi;
pub use roles::{Role, Sample};
pub use trend::{Classification, TrendAnalyzer, TrendState};
