//! # Pipeline Error Types
//!
//! Crate-wide error handling built on thiserror. Task-level and dispatch-level
//! failures never surface here; they are recorded on the task itself. What does
//! surface is either structural (unknown batch, unknown task, unregistered
//! phase) or a failure of a collaborator (storage, compute provisioning,
//! downstream delivery).

use crate::config::ConfigurationError;
use crate::state_machine::InvalidTransition;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Batch not found: {batch_id}")]
    BatchNotFound { batch_id: String },

    #[error("Task {task_id} not found in current phase of batch {batch_id}")]
    TaskNotFound { batch_id: String, task_id: String },

    #[error("Batch {batch_id} is terminal ({status}); no further work is accepted")]
    BatchTerminal { batch_id: String, status: String },

    #[error("No phase registered for status: {status}")]
    PhaseNotRegistered { status: String },

    #[error("Payload mismatch in phase {phase}: {message}")]
    PayloadMismatch { phase: String, message: String },

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),

    #[error("Dispatch failed for task {task_id}: {message}")]
    DispatchFailed { task_id: String, message: String },

    #[error("Delivery failed for batch {batch_id}: {message}")]
    DeliveryFailed { batch_id: String, message: String },

    #[error("Phase execution error: {0}")]
    PhaseExecution(String),

    #[error("Storage error: {operation}: {message}")]
    Storage { operation: String, message: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl PipelineError {
    pub fn batch_not_found(batch_id: impl Into<String>) -> Self {
        Self::BatchNotFound {
            batch_id: batch_id.into(),
        }
    }

    pub fn task_not_found(batch_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self::TaskNotFound {
            batch_id: batch_id.into(),
            task_id: task_id.into(),
        }
    }

    pub fn payload_mismatch(phase: impl std::fmt::Display, message: impl Into<String>) -> Self {
        Self::PayloadMismatch {
            phase: phase.to_string(),
            message: message.into(),
        }
    }

    pub fn dispatch_failed(task_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DispatchFailed {
            task_id: task_id.into(),
            message: message.into(),
        }
    }

    pub fn delivery_failed(batch_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DeliveryFailed {
            batch_id: batch_id.into(),
            message: message.into(),
        }
    }

    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Whether the caller (rather than this service) is at fault
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::BatchNotFound { .. }
                | Self::TaskNotFound { .. }
                | Self::BatchTerminal { .. }
                | Self::PayloadMismatch { .. }
                | Self::InvalidSubmission(_)
        )
    }

    /// Whether the error means the addressed resource does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::BatchNotFound { .. } | Self::TaskNotFound { .. })
    }
}
