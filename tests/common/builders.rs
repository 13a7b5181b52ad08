//! Builders for submissions, callback reports and test configuration.

use serde_json::json;

use pipeline_core::config::PipelineConfig;
use pipeline_core::models::{BatchState, BatchSubmission, DirectoryGroup, SubmittedFile};
use pipeline_core::phases::CallbackReport;
use pipeline_core::state_machine::TaskStatus;

/// Configuration with millisecond timers so tests never wait on defaults
pub fn fast_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.orchestrator_base_url = "http://orchestrator.test".to_string();
    config.retry.initial_delay_ms = 10;
    config.retry.backoff_base_ms = 10;
    config.retry.backoff_cap_ms = 100;
    config.retry.max_attempts = 5;
    config.phases.conversion.timer_delay_ms = 10;
    config.phases.processing.timer_delay_ms = 10;
    config.scheduler.poll_interval_ms = 5;
    config.scheduler.timer_lease_ms = 20;
    config
}

pub fn file(name: &str, content_type: &str) -> SubmittedFile {
    SubmittedFile {
        key: format!("uploads/{name}"),
        path: format!("/holiday/{name}"),
        name: name.to_string(),
        size: 1024,
        content_type: content_type.to_string(),
        content_id: None,
    }
}

pub fn heic(name: &str) -> SubmittedFile {
    file(name, "image/heic")
}

pub fn submission(batch_id: &str, files: Vec<SubmittedFile>) -> BatchSubmission {
    BatchSubmission {
        batch_id: batch_id.to_string(),
        directories: vec![DirectoryGroup {
            path: "/holiday".to_string(),
            files,
            processing_config: json!({"quality": 85}),
        }],
    }
}

/// Successful conversion report for the task whose input is `input_key`
pub fn conversion_success(batch_id: &str, task_id: &str, input_key: &str) -> CallbackReport {
    let stem = input_key
        .rsplit('/')
        .next()
        .and_then(|name| name.split('.').next())
        .unwrap_or("out");
    CallbackReport::success(
        batch_id,
        task_id,
        json!({
            "output_key": format!("processed/{stem}.jpg"),
            "output_name": format!("{stem}.jpg"),
            "output_size": 2048,
            "download_ms": 12,
            "process_ms": 340
        }),
    )
}

pub fn processing_success(batch_id: &str, task_id: &str, variants: usize) -> CallbackReport {
    let variants: Vec<_> = (0..variants)
        .map(|i| {
            json!({
                "key": format!("processed/{task_id}_{i}.webp"),
                "name": format!("{task_id}_{i}.webp"),
                "size": 512,
                "content_type": "image/webp",
                "label": format!("v{i}")
            })
        })
        .collect();
    CallbackReport::success(
        batch_id,
        task_id,
        json!({
            "reference_id": format!("asset-{task_id}"),
            "width": 800,
            "height": 600,
            "variants": variants
        }),
    )
}

/// (task_id, input_key) of every task with `status`, in key order
pub fn tasks_with_status(state: &BatchState, status: TaskStatus) -> Vec<(String, String)> {
    state
        .current_phase_tasks
        .values()
        .filter(|t| t.status == status)
        .map(|t| (t.task_id.clone(), t.input_key.clone()))
        .collect()
}

pub fn all_tasks(state: &BatchState) -> Vec<(String, String)> {
    state
        .current_phase_tasks
        .values()
        .map(|t| (t.task_id.clone(), t.input_key.clone()))
        .collect()
}
