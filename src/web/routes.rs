//! # Web API Route Definitions

use axum::routing::{get, post};
use axum::Router;

use crate::web::handlers;
use crate::web::state::AppState;

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health::basic_health))
}

pub fn batch_routes() -> Router<AppState> {
    Router::new()
        .route("/batches", post(handlers::batches::submit_batch))
        .route("/batches/:batch_id", get(handlers::batches::get_batch))
}

/// Worker completion callbacks, matching the URL handed out at dispatch
pub fn callback_routes() -> Router<AppState> {
    Router::new().route(
        "/callback/:batch_id/:task_id",
        post(handlers::callbacks::receive_callback),
    )
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().route(
        "/admin/batches/:batch_id/reset",
        post(handlers::batches::reset_batch),
    )
}
