//! # Completion Callback Handler

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::orchestration::CallbackOutcome;
use crate::phases::CallbackReport;
use crate::web::errors::{ApiError, ApiResult};
use crate::web::state::AppState;

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub accepted: bool,
    pub duplicate: bool,
    pub transitioned: bool,
}

/// Worker completion: POST /callback/:batch_id/:task_id
pub async fn receive_callback(
    State(state): State<AppState>,
    Path((batch_id, task_id)): Path<(String, String)>,
    Json(report): Json<CallbackReport>,
) -> ApiResult<Json<CallbackResponse>> {
    if report.batch_id != batch_id || report.task_id != task_id {
        return Err(ApiError::bad_request(format!(
            "body identifies {}/{} but the URL names {}/{}",
            report.batch_id, report.task_id, batch_id, task_id
        )));
    }

    let outcome = state
        .orchestrator
        .callback(&batch_id, &task_id, report)
        .await?;

    let response = match outcome {
        CallbackOutcome::Applied { transitioned } => CallbackResponse {
            accepted: true,
            duplicate: false,
            transitioned,
        },
        CallbackOutcome::Duplicate => CallbackResponse {
            accepted: true,
            duplicate: true,
            transitioned: false,
        },
    };
    Ok(Json(response))
}
