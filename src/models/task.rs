use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::phases::conversion::ConversionPayload;
use crate::phases::processing::ProcessingPayload;
use crate::state_machine::{PhaseId, TaskStatus};

/// Phase-specific task payload.
///
/// Tagged by phase so a task's input and output shape is fixed by the phase
/// that discovered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPayload {
    Conversion(ConversionPayload),
    Processing(ProcessingPayload),
}

impl TaskPayload {
    pub fn phase(&self) -> PhaseId {
        match self {
            Self::Conversion(_) => PhaseId::Conversion,
            Self::Processing(_) => PhaseId::Processing,
        }
    }
}

/// Optional performance timing reported by remote workers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallbackTiming {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_ms: Option<u64>,
}

impl CallbackTiming {
    pub fn is_empty(&self) -> bool {
        self.queued_ms.is_none()
            && self.download_ms.is_none()
            && self.process_ms.is_none()
            && self.upload_ms.is_none()
    }
}

/// One unit of remote work, scoped to the phase that discovered it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub status: TaskStatus,
    /// Failed dispatch attempts
    pub retry_count: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Storage key of the file this task was discovered from
    pub input_key: String,
    /// Remote compute instance handling the task
    pub instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<CallbackTiming>,
    pub payload: TaskPayload,
}

impl Task {
    pub fn new(input_key: impl Into<String>, payload: TaskPayload) -> Self {
        let input_key = input_key.into();
        Self {
            task_id: task_id_for(payload.phase(), &input_key),
            status: TaskStatus::Pending,
            retry_count: 0,
            started_at: None,
            completed_at: None,
            error: None,
            input_key,
            instance_id: None,
            timing: None,
            payload,
        }
    }

    pub fn phase(&self) -> PhaseId {
        self.payload.phase()
    }

    pub fn is_resolved(&self) -> bool {
        self.status.is_resolved()
    }

    /// Dispatch accepted by the provisioner
    pub fn mark_processing(&mut self, instance_id: impl Into<String>, now: DateTime<Utc>) {
        self.status = TaskStatus::Processing;
        self.instance_id = Some(instance_id.into());
        self.started_at = Some(now);
        self.error = None;
    }

    /// Dispatch rejected; the task stays pending for the next tick
    pub fn record_dispatch_failure(&mut self, message: impl Into<String>) {
        self.status = TaskStatus::Pending;
        self.retry_count += 1;
        self.error = Some(message.into());
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(now);
        self.error = None;
    }

    pub fn mark_failed(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.status = TaskStatus::Failed;
        self.completed_at = Some(now);
        self.error = Some(message.into());
    }

    /// Whether a processing task has exceeded `timeout` at `now`
    pub fn is_timed_out(&self, timeout: std::time::Duration, now: DateTime<Utc>) -> bool {
        if self.status != TaskStatus::Processing {
            return false;
        }
        let Some(started_at) = self.started_at else {
            return false;
        };
        let elapsed = now.signed_duration_since(started_at);
        match chrono::Duration::from_std(timeout) {
            Ok(limit) => elapsed > limit,
            Err(_) => false,
        }
    }
}

/// Deterministic task identity: same phase + same input key, same id
pub fn task_id_for(phase: PhaseId, input_key: &str) -> String {
    let name = format!("{}:{}", phase.as_str(), input_key);
    let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes());
    format!("{}-{}", phase.as_str().to_ascii_lowercase(), id)
}
