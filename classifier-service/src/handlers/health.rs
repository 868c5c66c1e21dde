use axum::{extract::State, Json};
use serde::Serialize;

use crate::startup::AppState;

pub const HEALTH_MESSAGE: &str = "Email classifier backend is running";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub ai_api: &'static str,
    pub message: &'static str,
}

/// Liveness plus whether the AI credential was present at startup. Never
/// calls the provider.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let ai_api = if state.config.gemini.is_configured() {
        "configured"
    } else {
        "not configured"
    };

    Json(HealthResponse {
        status: "online",
        ai_api,
        message: HEALTH_MESSAGE,
    })
}
