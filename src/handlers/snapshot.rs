use axum::{extract::State, response::IntoResponse, Json};
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Handler for the /snapshot endpoint.
#[instrument(skip(state))]
pub async fn snapshot_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /snapshot request");
    Json(state.query.snapshot())
}
