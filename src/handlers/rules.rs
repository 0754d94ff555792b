//! Rule table endpoint handler.

use axum::{extract::State, response::IntoResponse};
use tracing::{debug, instrument};

use crate::process::classifier::render_rules;
use crate::state::SharedState;

/// Handler for the /rules endpoint.
#[instrument(skip(state))]
pub async fn rules_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /rules request");
    let active = state.config().current();
    (
        [("Content-Type", "text/plain; charset=utf-8")],
        render_rules(&active.config.rules),
    )
}
