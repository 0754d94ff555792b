//! HTTP endpoint handlers.
//!
//! - `/snapshot`: latest sample, trend and availability per role
//! - `/history`: retained samples for one role
//! - `/processes`: classification result of the latest tick
//! - `/stream`: server-sent events push channel
//! - `/health`: sampler health table
//! - `/metrics`: Prometheus metrics endpoint
//! - `/config`: effective configuration
//! - `/rules`: classification rule table

pub mod config;
pub mod health;
pub mod history;
pub mod metrics;
pub mod processes;
pub mod rules;
pub mod snapshot;
pub mod stream;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;

use crate::state::SharedState;

// Re-export handlers
pub use config::config_handler;
pub use health::health_handler;
pub use history::history_handler;
pub use metrics::metrics_handler;
pub use processes::processes_handler;
pub use rules::rules_handler;
pub use snapshot::snapshot_handler;
pub use stream::stream_handler;

/// Error type for handler failures.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError::BadRequest(message) = self;
        (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
    }
}

/// Builds the router. `/health` and `/metrics` follow the server config.
pub fn router(state: SharedState) -> Router {
    let server = state.config().current().config.server.clone();

    let mut app = Router::new()
        .route("/snapshot", get(snapshot_handler))
        .route("/history", get(history_handler))
        .route("/processes", get(processes_handler))
        .route("/stream", get(stream_handler))
        .route("/config", get(config_handler))
        .route("/rules", get(rules_handler));

    if server.enable_health {
        app = app.route("/health", get(health_handler));
    }
    if server.enable_metrics {
        app = app.route("/metrics", get(metrics_handler));
    }

    app.with_state(state)
}
