//! Alert registration.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use relay_common::error::AppError;
use relay_common::types::LineType;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/set-alert", post(set_alert))
}

/// Request body for alert registration.
#[derive(Debug, Deserialize)]
pub struct SetAlertRequest {
    /// Mailbox the alert is for
    pub email: String,
    /// WhatsApp number in E.164 format
    pub whatsapp: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// POST /api/set-alert — Verify that the number is a mobile line before accepting the alert.
async fn set_alert(
    State(state): State<AppState>,
    Json(req): Json<SetAlertRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let email = req.email.trim();
    let whatsapp = req.whatsapp.trim();
    if email.is_empty() || whatsapp.is_empty() {
        return Err(AppError::Validation(
            "Both email and whatsapp are required".to_string(),
        ));
    }

    let line_type = state.verifier.line_type(whatsapp).await.map_err(|e| {
        tracing::warn!(error = %e, "Phone number lookup failed");
        AppError::Verification("Phone number verification failed. Register on Twilio.".to_string())
    })?;

    if line_type != Some(LineType::Mobile) {
        tracing::info!(
            line_type = %line_type.map(|t| t.to_string()).unwrap_or_else(|| "unknown".to_string()),
            "Rejected alert for non-mobile number"
        );
        return Err(AppError::Verification(
            "Phone number is not registered on WhatsApp.".to_string(),
        ));
    }

    tracing::info!("Alert registered");

    Ok(Json(MessageResponse {
        message: "Alert set successfully!".to_string(),
    }))
}
