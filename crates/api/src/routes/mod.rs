pub mod alerts;
pub mod health;
pub mod queue;

use axum::Router;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(alerts::router())
        .merge(queue::router())
        .with_state(state)
}
