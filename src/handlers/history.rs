//! History endpoint handler.
//!
//! `GET /history?role=<role>&window=<window>` where the window is `all`, a
//! sample count (`120`) or a duration relative to the newest sample (`90s`,
//! `5m`, `1h`).

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::handlers::ApiError;
use crate::history::Window;
use crate::query::HistoryResponse;
use crate::roles::Role;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub role: Option<String>,
    pub window: Option<String>,
}

/// Handler for the /history endpoint.
#[instrument(skip(state))]
pub async fn history_handler(
    State(state): State<SharedState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    debug!("Processing /history request");

    let role: Role = params
        .role
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("missing 'role' parameter".to_string()))?
        .parse()
        .map_err(ApiError::BadRequest)?;
    let window: Window = params
        .window
        .as_deref()
        .unwrap_or("all")
        .parse()
        .map_err(ApiError::BadRequest)?;

    Ok(Json(state.query.history(role, window)))
}
