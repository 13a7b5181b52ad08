//! # Phases
//!
//! A phase is one linear stage of the batch pipeline. Every phase honours the
//! same five-operation contract:
//!
//! - [`Phase::discover`]: pick the files this phase works on and create one
//!   task per file (deterministic, skips the phase's own earlier output)
//! - [`Phase::execute_batch`]: reconcile timeouts, then dispatch a bounded
//!   slice of pending tasks to remote compute in parallel
//! - [`Phase::handle_callback`]: apply a remote worker's result to its task
//! - [`Phase::transform_file`]: turn one previous-phase file (plus its task,
//!   if any) into zero or more files for the next phase
//! - [`Phase::next_phase`]: name the next phase, or `None` at end of chain
//!
//! Task payloads and callback outputs are phase-typed through
//! [`TaskPayload`](crate::models::TaskPayload); a phase rejects payloads that
//! belong to another phase instead of guessing at their shape.

pub mod conversion;
pub mod dispatch;
pub mod processing;
pub mod registry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::clients::compute::{ComputeProvisioner, ProvisionRequest};
use crate::config::{ComputeConfig, PhaseSettings, PipelineConfig, StorageConfig};
use crate::error::Result;
use crate::models::{BatchState, CallbackTiming, ProcessableFile, Task};

pub use crate::state_machine::PhaseId;
pub use conversion::ConversionPhase;
pub use processing::ProcessingPhase;
pub use registry::PhaseRegistry;

/// Collaborators and settings a phase needs to dispatch work
#[derive(Clone)]
pub struct PhaseContext {
    pub provisioner: Arc<dyn ComputeProvisioner>,
    pub compute: ComputeConfig,
    pub storage: StorageConfig,
    pub callback_base_url: String,
}

impl std::fmt::Debug for PhaseContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseContext")
            .field("callback_base_url", &self.callback_base_url)
            .field("region", &self.compute.region)
            .finish_non_exhaustive()
    }
}

impl PhaseContext {
    pub fn new(provisioner: Arc<dyn ComputeProvisioner>, config: &PipelineConfig) -> Self {
        Self {
            provisioner,
            compute: config.compute.clone(),
            storage: config.storage.clone(),
            callback_base_url: config.orchestrator_base_url.clone(),
        }
    }

    /// `{orchestrator_base}/callback/{batch_id}/{task_id}`
    pub fn callback_url(&self, batch_id: &str, task_id: &str) -> String {
        format!(
            "{}/callback/{}/{}",
            self.callback_base_url.trim_end_matches('/'),
            batch_id,
            task_id
        )
    }
}

/// Reported outcome of a remote task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackStatus {
    Success,
    Error,
}

/// Body of a completion callback.
///
/// Phase-specific output fields stay in `fields` until the owning phase
/// decodes them into its own output type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackReport {
    pub task_id: String,
    pub batch_id: String,
    pub status: CallbackStatus,
    #[serde(default, alias = "message", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl CallbackReport {
    pub fn success(
        batch_id: impl Into<String>,
        task_id: impl Into<String>,
        fields: serde_json::Value,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            batch_id: batch_id.into(),
            status: CallbackStatus::Success,
            error: None,
            fields: match fields {
                serde_json::Value::Object(map) => map,
                _ => serde_json::Map::new(),
            },
        }
    }

    pub fn failure(
        batch_id: impl Into<String>,
        task_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            batch_id: batch_id.into(),
            status: CallbackStatus::Error,
            error: Some(message.into()),
            fields: serde_json::Map::new(),
        }
    }

    /// Decode the phase-specific output fields
    pub fn decode_output<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(serde_json::Value::Object(self.fields.clone()))
    }

    /// Optional timing fields, if the worker sent any
    pub fn timing(&self) -> Option<CallbackTiming> {
        let timing: CallbackTiming = self.decode_output().unwrap_or_default();
        (!timing.is_empty()).then_some(timing)
    }

    pub fn error_message(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| "remote worker reported an error without a message".to_string())
    }
}

/// The phase contract
#[async_trait]
pub trait Phase: Send + Sync + 'static {
    fn id(&self) -> PhaseId;

    /// Select relevant files and create one task per file
    fn discover(&self, files: &[ProcessableFile]) -> Vec<Task>;

    /// Build the provisioning request for one pending task
    fn provision_request(
        &self,
        task: &Task,
        batch_id: &str,
        ctx: &PhaseContext,
    ) -> Result<ProvisionRequest>;

    /// Reconcile timeouts and dispatch up to `settings.batch_size` pending
    /// tasks. Returns `false` once every task is completed or failed.
    async fn execute_batch(
        &self,
        state: &mut BatchState,
        settings: &PhaseSettings,
        ctx: &PhaseContext,
    ) -> Result<bool> {
        dispatch::execute_batch(self, state, settings, ctx).await
    }

    /// Apply a remote worker's result to the task and the batch counters
    fn handle_callback(
        &self,
        task_id: &str,
        report: &CallbackReport,
        state: &mut BatchState,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Map one previous-phase file (and its task, if any) to next-phase files
    fn transform_file(&self, file: &ProcessableFile, task: Option<&Task>) -> Vec<ProcessableFile>;

    fn next_phase(&self) -> Option<PhaseId>;
}
