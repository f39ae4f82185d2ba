//! Shared application state for the Axum API server.

use std::sync::Arc;

use relay_notifier::{DeliveryQueue, PhoneVerifier};

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub queue: DeliveryQueue,
    pub verifier: Arc<dyn PhoneVerifier>,
}

impl AppState {
    pub fn new(queue: DeliveryQueue, verifier: Arc<dyn PhoneVerifier>) -> Self {
        Self { queue, verifier }
    }
}
