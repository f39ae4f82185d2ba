//! Delivery queue status.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use relay_common::types::QueueSnapshot;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/queue", get(queue_status))
}

/// GET /api/queue — Pending messages, drain status, current delay and counters.
async fn queue_status(State(state): State<AppState>) -> Json<QueueSnapshot> {
    Json(state.queue.snapshot())
}
