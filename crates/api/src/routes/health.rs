//! Health check, with the delivery queue's backlog attached.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    /// Messages waiting in the delivery queue
    pub pending: usize,
    /// Whether a drain task is currently running
    pub draining: bool,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.queue.snapshot();
    Json(HealthResponse {
        status: "ok",
        service: "inbox-relay-api",
        version: env!("CARGO_PKG_VERSION"),
        pending: snapshot.pending,
        draining: snapshot.draining,
    })
}
