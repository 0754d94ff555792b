//! Configuration display endpoint handler.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, error, instrument};

use crate::config::{render_config, FileFormat};
use crate::state::SharedState;

/// Handler for the /config endpoint. Renders the effective config as YAML.
#[instrument(skip(state))]
pub async fn config_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /config request");

    let active = state.config().current();
    match render_config(&active.config, FileFormat::Yaml) {
        Ok(yaml) => (
            StatusCode::OK,
            [("Content-Type", "application/yaml; charset=utf-8")],
            yaml,
        ),
        Err(e) => {
            error!("Failed to render config: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("Content-Type", "text/plain; charset=utf-8")],
                e.to_string(),
            )
        }
    }
}
