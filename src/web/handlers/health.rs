//! # Health Check Handlers

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::web::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    environment: String,
    phases: Vec<String>,
    timestamp: String,
}

/// Basic health check endpoint: GET /health
pub async fn basic_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        environment: state.environment.clone(),
        phases: state
            .orchestrator
            .registry()
            .ids()
            .into_iter()
            .map(|id| id.to_string())
            .collect(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
