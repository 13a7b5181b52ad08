//! Second-stage image processing.
//!
//! Every image is analysed and registered with the delivery service by a
//! remote worker, which may also render derived variants. A completed task
//! augments the original file with the returned reference metadata and emits
//! one additional file per variant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::dispatch::base_request;
use super::{CallbackReport, CallbackStatus, Phase, PhaseContext};
use crate::clients::compute::ProvisionRequest;
use crate::error::{PipelineError, Result};
use crate::models::{BatchState, ProcessableFile, Task, TaskPayload};
use crate::state_machine::{PhaseId, TaskStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingPayload {
    pub input_name: String,
    pub input_content_type: String,
    #[serde(default)]
    pub processing_config: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ProcessingOutput>,
}

/// Success fields of a processing callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingOutput {
    /// Asset id assigned by the delivery service
    pub reference_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default)]
    pub variants: Vec<DerivedVariant>,
}

/// A derived rendition written by the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedVariant {
    pub key: String,
    pub name: String,
    pub size: u64,
    pub content_type: String,
    pub label: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessingPhase;

impl ProcessingPhase {
    pub fn is_image(file: &ProcessableFile) -> bool {
        file.content_type.to_ascii_lowercase().starts_with("image/")
    }

    fn payload(task: &Task) -> Result<&ProcessingPayload> {
        match &task.payload {
            TaskPayload::Processing(payload) => Ok(payload),
            other => Err(PipelineError::payload_mismatch(
                PhaseId::Processing,
                format!("task {} carries a {} payload", task.task_id, other.phase()),
            )),
        }
    }

    fn augmented(file: &ProcessableFile, output: &ProcessingOutput) -> ProcessableFile {
        let mut augmented = file.clone();
        let mut config = match &file.processing_config {
            serde_json::Value::Object(map) => map.clone(),
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("submitted".to_string(), other.clone());
                map
            }
        };
        config.insert(
            "reference_id".to_string(),
            serde_json::Value::String(output.reference_id.clone()),
        );
        if let Some(width) = output.width {
            config.insert("width".to_string(), width.into());
        }
        if let Some(height) = output.height {
            config.insert("height".to_string(), height.into());
        }
        augmented.processing_config = serde_json::Value::Object(config);
        augmented.push_tag(PhaseId::Processing.produced_by_tag());
        augmented
    }

    fn variant_file(file: &ProcessableFile, variant: &DerivedVariant) -> ProcessableFile {
        ProcessableFile {
            key: variant.key.clone(),
            path: file.path.clone(),
            name: variant.name.clone(),
            content_type: variant.content_type.clone(),
            size: variant.size,
            content_id: None,
            processing_config: file.processing_config.clone(),
            source_file_name: Some(file.name.clone()),
            tags: vec![
                PhaseId::Processing.produced_by_tag(),
                format!("variant:{}", variant.label),
            ],
        }
    }
}

impl Phase for ProcessingPhase {
    fn id(&self) -> PhaseId {
        PhaseId::Processing
    }

    fn discover(&self, files: &[ProcessableFile]) -> Vec<Task> {
        files
            .iter()
            .filter(|file| !file.produced_by(PhaseId::Processing))
            .filter(|file| Self::is_image(file))
            .map(|file| {
                Task::new(
                    &file.key,
                    TaskPayload::Processing(ProcessingPayload {
                        input_name: file.name.clone(),
                        input_content_type: file.content_type.clone(),
                        processing_config: file.processing_config.clone(),
                        output: None,
                    }),
                )
            })
            .collect()
    }

    fn provision_request(
        &self,
        task: &Task,
        batch_id: &str,
        ctx: &PhaseContext,
    ) -> Result<ProvisionRequest> {
        let payload = Self::payload(task)?;
        let mut request = base_request(
            self.id(),
            task,
            batch_id,
            serde_json::to_value(payload)?,
            ctx,
        );
        request.environment.insert(
            "PROCESSING_CONFIG".to_string(),
            payload.processing_config.to_string(),
        );
        Ok(request)
    }

    fn handle_callback(
        &self,
        task_id: &str,
        report: &CallbackReport,
        state: &mut BatchState,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let batch_id = state.batch_id.clone();
        let task = state
            .current_phase_tasks
            .get_mut(task_id)
            .ok_or_else(|| PipelineError::task_not_found(&batch_id, task_id))?;

        match report.status {
            CallbackStatus::Success => {
                let output: ProcessingOutput = report.decode_output().map_err(|e| {
                    PipelineError::payload_mismatch(
                        PhaseId::Processing,
                        format!("invalid processing output for {task_id}: {e}"),
                    )
                })?;
                let TaskPayload::Processing(payload) = &mut task.payload else {
                    return Err(PipelineError::payload_mismatch(
                        PhaseId::Processing,
                        format!("task {task_id} is not a processing task"),
                    ));
                };
                payload.output = Some(output);
                task.timing = report.timing();
                task.mark_completed(now);
                state.record_completed();
            }
            CallbackStatus::Error => {
                task.timing = report.timing();
                task.mark_failed(report.error_message(), now);
                state.record_failed();
            }
        }
        Ok(())
    }

    fn transform_file(&self, file: &ProcessableFile, task: Option<&Task>) -> Vec<ProcessableFile> {
        let output = task
            .filter(|t| t.status == TaskStatus::Completed)
            .and_then(|t| match &t.payload {
                TaskPayload::Processing(payload) => payload.output.as_ref(),
                _ => None,
            });

        let Some(output) = output else {
            return vec![file.clone()];
        };

        let mut files = Vec::with_capacity(1 + output.variants.len());
        files.push(Self::augmented(file, output));
        files.extend(
            output
                .variants
                .iter()
                .map(|variant| Self::variant_file(file, variant)),
        );
        files
    }

    fn next_phase(&self) -> Option<PhaseId> {
        None
    }
}
