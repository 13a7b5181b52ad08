//! Shared application state for the web layer.

use std::sync::Arc;

use crate::orchestration::BatchOrchestrator;

#[derive(Clone, Debug)]
pub struct AppState {
    pub orchestrator: Arc<BatchOrchestrator>,
    pub environment: String,
}

impl AppState {
    pub fn new(orchestrator: Arc<BatchOrchestrator>, environment: impl Into<String>) -> Self {
        Self {
            orchestrator,
            environment: environment.into(),
        }
    }
}
