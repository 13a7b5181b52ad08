//! # Web API Module
//!
//! Thin axum surface over the orchestrator:
//!
//! - `POST /batches` submission intake
//! - `POST /callback/:batch_id/:task_id` completion callbacks from workers
//! - `GET /batches/:batch_id` status query
//! - `POST /admin/batches/:batch_id/reset` administrative reset
//! - `GET /health` liveness

pub mod errors;
pub mod handlers;
pub mod routes;
pub mod state;

use axum::Router;
use tower_http::trace::TraceLayer;

pub use errors::ApiError;
pub use state::AppState;

/// Create the Axum application with all routes
pub fn create_app(app_state: AppState) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .merge(routes::batch_routes())
        .merge(routes::callback_routes())
        .merge(routes::admin_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
