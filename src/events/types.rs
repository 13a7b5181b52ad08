//! Batch lifecycle events.

use serde::{Deserialize, Serialize};

use crate::state_machine::PhaseId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrchestrationEvent {
    BatchStarted {
        batch_id: String,
        phase: PhaseId,
        tasks_discovered: u32,
    },
    TasksDispatched {
        batch_id: String,
        phase: PhaseId,
        processing: u32,
        pending: u32,
    },
    TaskResolved {
        batch_id: String,
        task_id: String,
        succeeded: bool,
    },
    PhaseTransitioned {
        batch_id: String,
        from: PhaseId,
        /// `None` when the chain ended
        to: Option<PhaseId>,
        files_out: usize,
    },
    BatchFinalized {
        batch_id: String,
        file_count: usize,
    },
    BatchErrored {
        batch_id: String,
        error: String,
    },
    BatchReset {
        batch_id: String,
        reason: String,
    },
    RetryScheduled {
        batch_id: String,
        attempt: u32,
        delay_ms: u64,
    },
}

impl OrchestrationEvent {
    pub fn batch_id(&self) -> &str {
        match self {
            Self::BatchStarted { batch_id, .. }
            | Self::TasksDispatched { batch_id, .. }
            | Self::TaskResolved { batch_id, .. }
            | Self::PhaseTransitioned { batch_id, .. }
            | Self::BatchFinalized { batch_id, .. }
            | Self::BatchErrored { batch_id, .. }
            | Self::BatchReset { batch_id, .. }
            | Self::RetryScheduled { batch_id, .. } => batch_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::BatchStarted { .. } => "batch.started",
            Self::TasksDispatched { .. } => "batch.tasks_dispatched",
            Self::TaskResolved { .. } => "task.resolved",
            Self::PhaseTransitioned { .. } => "batch.phase_transitioned",
            Self::BatchFinalized { .. } => "batch.finalized",
            Self::BatchErrored { .. } => "batch.errored",
            Self::BatchReset { .. } => "batch.reset",
            Self::RetryScheduled { .. } => "batch.retry_scheduled",
        }
    }
}
