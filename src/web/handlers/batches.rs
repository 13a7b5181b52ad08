//! # Batch Handlers
//!
//! Submission intake, status query and administrative reset.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::info;

use crate::models::{BatchStatusView, BatchSubmission};
use crate::web::errors::{ApiError, ApiResult};
use crate::web::state::AppState;

/// Start a batch: POST /batches
///
/// 202 when a new run began, 200 when the batch already existed.
pub async fn submit_batch(
    State(state): State<AppState>,
    Json(submission): Json<BatchSubmission>,
) -> ApiResult<(StatusCode, Json<BatchStatusView>)> {
    let outcome = state.orchestrator.start(submission).await?;
    let status = if outcome.is_new() {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome.view().clone())))
}

/// Batch status: GET /batches/:batch_id
pub async fn get_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> ApiResult<Json<BatchStatusView>> {
    Ok(Json(state.orchestrator.status(&batch_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub reason: String,
}

/// Administrative reset: POST /admin/batches/:batch_id/reset
pub async fn reset_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
    Json(request): Json<ResetRequest>,
) -> ApiResult<Json<BatchStatusView>> {
    if request.reason.trim().is_empty() {
        return Err(ApiError::bad_request("reset reason must not be empty"));
    }
    info!(batch_id = %batch_id, reason = %request.reason, "Administrative reset requested");
    Ok(Json(state.orchestrator.reset(&batch_id, &request.reason).await?))
}
