//! Web error type and its JSON rendering.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::error::PipelineError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{message}")]
    NotFound { message: String },

    #[error("{message}")]
    BadRequest { message: String },

    #[error("{message}")]
    Conflict { message: String },

    #[error("{message}")]
    Internal { message: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::BadRequest { .. } => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Conflict { .. } => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let message = err.to_string();
        match &err {
            PipelineError::BatchNotFound { .. } | PipelineError::TaskNotFound { .. } => {
                Self::NotFound { message }
            }
            PipelineError::BatchTerminal { .. } | PipelineError::InvalidTransition(_) => {
                Self::Conflict { message }
            }
            _ if err.is_client_error() => Self::BadRequest { message },
            _ => {
                error!(error = %message, "Request failed");
                Self::Internal { message }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status_code, code) = self.parts();
        let body = json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        });
        (status_code, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
