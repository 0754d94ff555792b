use axum::{extract::State, response::IntoResponse, Json};
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Handler for the /processes endpoint.
#[instrument(skip(state))]
pub async fn processes_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /processes request");
    let inventory = state.query.process_inventory();
    Json((*inventory).clone())
}
