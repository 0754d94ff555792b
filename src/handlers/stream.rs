//! Push channel over server-sent events.
//!
//! A client first receives one `snapshot` event per role with data, then a
//! `delta` event for every new sample. A client that cannot keep up is
//! disconnected by the hub and may reconnect for a fresh snapshot.

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use serde::Deserialize;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, instrument};

use crate::handlers::ApiError;
use crate::hub::RoleFilter;
use crate::roles::Role;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    pub role: Option<String>,
}

/// Handler for the /stream endpoint.
#[instrument(skip(state))]
pub async fn stream_handler(
    State(state): State<SharedState>,
    Query(params): Query<StreamParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let filter = match params.role.as_deref() {
        None | Some("all") => RoleFilter::All,
        Some(r) => RoleFilter::Only(r.parse::<Role>().map_err(ApiError::BadRequest)?),
    };

    let subscription = state.monitor.subscribe(filter);
    debug!(subscriber = subscription.id(), "Opened /stream");

    let events = subscription.map(|msg| Event::default().event(msg.kind.as_str()).json_data(&msg));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
