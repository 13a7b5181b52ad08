//! First-stage format conversion.
//!
//! Camera raw, HEIF and TIFF inputs are converted to JPEG by a remote worker.
//! A completed conversion replaces the original file in the next phase's
//! input list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::dispatch::base_request;
use super::{CallbackReport, CallbackStatus, Phase, PhaseContext};
use crate::clients::compute::ProvisionRequest;
use crate::error::{PipelineError, Result};
use crate::models::{BatchState, ProcessableFile, Task, TaskPayload};
use crate::state_machine::{PhaseId, TaskStatus};

const CONVERTIBLE_CONTENT_TYPES: &[&str] = &[
    "image/heic",
    "image/heif",
    "image/tiff",
    "image/x-adobe-dng",
    "image/x-canon-cr2",
    "image/x-nikon-nef",
    "image/x-sony-arw",
];

const CONVERTIBLE_EXTENSIONS: &[&str] = &["heic", "heif", "tif", "tiff", "dng", "cr2", "nef", "arw"];

pub const TARGET_CONTENT_TYPE: &str = "image/jpeg";

/// Conversion task input, plus the converted output once completed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionPayload {
    pub input_name: String,
    pub input_content_type: String,
    pub target_content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ConversionOutput>,
}

/// Success fields of a conversion callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionOutput {
    pub output_key: String,
    pub output_name: String,
    pub output_size: u64,
    #[serde(default = "default_output_content_type")]
    pub output_content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
}

fn default_output_content_type() -> String {
    TARGET_CONTENT_TYPE.to_string()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConversionPhase;

impl ConversionPhase {
    pub fn is_convertible(file: &ProcessableFile) -> bool {
        let content_type = file.content_type.to_ascii_lowercase();
        if CONVERTIBLE_CONTENT_TYPES.contains(&content_type.as_str()) {
            return true;
        }
        file.extension()
            .is_some_and(|ext| CONVERTIBLE_EXTENSIONS.contains(&ext.as_str()))
    }

    fn payload(task: &Task) -> Result<&ConversionPayload> {
        match &task.payload {
            TaskPayload::Conversion(payload) => Ok(payload),
            other => Err(PipelineError::payload_mismatch(
                PhaseId::Conversion,
                format!("task {} carries a {} payload", task.task_id, other.phase()),
            )),
        }
    }
}

impl Phase for ConversionPhase {
    fn id(&self) -> PhaseId {
        PhaseId::Conversion
    }

    fn discover(&self, files: &[ProcessableFile]) -> Vec<Task> {
        files
            .iter()
            .filter(|file| !file.produced_by(PhaseId::Conversion))
            .filter(|file| Self::is_convertible(file))
            .map(|file| {
                Task::new(
                    &file.key,
                    TaskPayload::Conversion(ConversionPayload {
                        input_name: file.name.clone(),
                        input_content_type: file.content_type.clone(),
                        target_content_type: TARGET_CONTENT_TYPE.to_string(),
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
            "TARGET_CONTENT_TYPE".to_string(),
            payload.target_content_type.clone(),
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
                let output: ConversionOutput = report.decode_output().map_err(|e| {
                    PipelineError::payload_mismatch(
                        PhaseId::Conversion,
                        format!("invalid conversion output for {task_id}: {e}"),
                    )
                })?;
                let TaskPayload::Conversion(payload) = &mut task.payload else {
                    return Err(PipelineError::payload_mismatch(
                        PhaseId::Conversion,
                        format!("task {task_id} is not a conversion task"),
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
                TaskPayload::Conversion(payload) => payload.output.as_ref(),
                _ => None,
            });

        let Some(output) = output else {
            return vec![file.clone()];
        };

        let mut converted = ProcessableFile {
            key: output.output_key.clone(),
            path: file.path.clone(),
            name: output.output_name.clone(),
            content_type: output.output_content_type.clone(),
            size: output.output_size,
            content_id: output.content_id.clone(),
            processing_config: file.processing_config.clone(),
            source_file_name: Some(file.name.clone()),
            tags: file.tags.clone(),
        };
        converted.push_tag(PhaseId::Conversion.produced_by_tag());
        vec![converted]
    }

    fn next_phase(&self) -> Option<PhaseId> {
        Some(PhaseId::Processing)
    }
}
