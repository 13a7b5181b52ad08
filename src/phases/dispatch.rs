//! Shared `execute_batch` implementation.
//!
//! Both concrete phases dispatch the same way: reconcile stale `processing`
//! tasks against the phase timeout, then fan out up to `batch_size` pending
//! tasks to the compute provisioner and wait for every request, tolerating
//! individual failures.

use chrono::Utc;
use futures::future::join_all;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::{Phase, PhaseContext};
use crate::clients::compute::{ProvisionRequest, ResourceSizing};
use crate::config::PhaseSettings;
use crate::error::{PipelineError, Result};
use crate::logging::log_phase_operation;
use crate::models::{BatchState, Task};
use crate::state_machine::{PhaseId, TaskStatus};

/// Reconcile timeouts, then dispatch a bounded slice of pending tasks.
///
/// Returns `false` once every task is completed or failed.
pub async fn execute_batch<P: Phase + ?Sized>(
    phase: &P,
    state: &mut BatchState,
    settings: &PhaseSettings,
    ctx: &PhaseContext,
) -> Result<bool> {
    let timed_out = reconcile_timeouts(state, settings);
    if timed_out > 0 {
        log_phase_operation(
            "reconcile_timeouts",
            &state.batch_id,
            phase.id(),
            "timed_out",
            Some(&format!("{timed_out} task(s) exceeded {:?}", settings.task_timeout())),
        );
    }

    let selected: Vec<String> = state
        .current_phase_tasks
        .values()
        .filter(|task| task.status == TaskStatus::Pending)
        .take(settings.batch_size)
        .map(|task| task.task_id.clone())
        .collect();

    if selected.is_empty() {
        return Ok(!state.all_tasks_resolved());
    }

    let mut requests = Vec::with_capacity(selected.len());
    for task_id in &selected {
        let task = state
            .current_phase_tasks
            .get(task_id)
            .ok_or_else(|| PipelineError::task_not_found(&state.batch_id, task_id))?;
        let request = phase
            .provision_request(task, &state.batch_id, ctx)
            .map_err(|e| {
                PipelineError::PhaseExecution(format!(
                    "could not build provisioning request for {task_id}: {e}"
                ))
            })?;
        requests.push((task_id.clone(), request));
    }

    let outcomes = join_all(requests.into_iter().map(|(task_id, request)| {
        let provisioner = ctx.provisioner.clone();
        async move { (task_id, provisioner.provision(request).await) }
    }))
    .await;

    let now = Utc::now();
    let mut dispatched = 0usize;
    let mut rejected = 0usize;
    for (task_id, outcome) in outcomes {
        let Some(task) = state.current_phase_tasks.get_mut(&task_id) else {
            continue;
        };
        match outcome {
            Ok(handle) => {
                debug!(
                    batch_id = %state.batch_id,
                    task_id = %task_id,
                    instance_id = %handle.instance_id,
                    "Task dispatched"
                );
                task.mark_processing(handle.instance_id, now);
                dispatched += 1;
            }
            Err(error) => {
                warn!(
                    batch_id = %state.batch_id,
                    task_id = %task_id,
                    retry_count = task.retry_count + 1,
                    error = %error,
                    "Dispatch failed, task stays pending"
                );
                task.record_dispatch_failure(error.to_string());
                rejected += 1;
            }
        }
    }

    log_phase_operation(
        "dispatch",
        &state.batch_id,
        phase.id(),
        "dispatched",
        Some(&format!("dispatched={dispatched} rejected={rejected}")),
    );

    Ok(!state.all_tasks_resolved())
}

/// Force `processing` tasks past the phase timeout to `failed`.
///
/// A task is counted when it flips, so a later call never counts it again.
pub fn reconcile_timeouts(state: &mut BatchState, settings: &PhaseSettings) -> usize {
    let now = Utc::now();
    let timeout = settings.task_timeout();
    let mut timed_out = 0;

    for task in state.current_phase_tasks.values_mut() {
        if task.is_timed_out(timeout, now) {
            task.mark_failed(
                format!("Task timed out after {} ms", settings.task_timeout_ms),
                now,
            );
            timed_out += 1;
        }
    }

    for _ in 0..timed_out {
        state.record_failed();
    }
    timed_out
}

/// Provisioning request with the environment every worker receives.
///
/// Phases add their own input metadata on top.
pub fn base_request(
    phase_id: PhaseId,
    task: &Task,
    batch_id: &str,
    input_metadata: serde_json::Value,
    ctx: &PhaseContext,
) -> ProvisionRequest {
    let mut environment = BTreeMap::new();
    environment.insert("TASK_ID".to_string(), task.task_id.clone());
    environment.insert("BATCH_ID".to_string(), batch_id.to_string());
    environment.insert("PHASE".to_string(), phase_id.to_string());
    environment.insert("INPUT_KEY".to_string(), task.input_key.clone());
    environment.insert("INPUT_METADATA".to_string(), input_metadata.to_string());
    environment.insert("STORAGE_BUCKET".to_string(), ctx.storage.bucket.clone());
    environment.insert("STORAGE_ENDPOINT".to_string(), ctx.storage.endpoint.clone());
    environment.insert(
        "STORAGE_ACCESS_KEY_ID".to_string(),
        ctx.storage.access_key_id.clone(),
    );
    environment.insert(
        "STORAGE_SECRET_ACCESS_KEY".to_string(),
        ctx.storage.secret_access_key.clone(),
    );
    environment.insert(
        "OUTPUT_PREFIX".to_string(),
        ctx.storage.output_prefix.clone(),
    );
    environment.insert(
        "CALLBACK_URL".to_string(),
        ctx.callback_url(batch_id, &task.task_id),
    );

    ProvisionRequest {
        image: ctx.compute.image_for(phase_id).to_string(),
        region: ctx.compute.region.clone(),
        auto_terminate: ctx.compute.auto_terminate,
        resources: ResourceSizing {
            cpu_cores: ctx.compute.cpu_cores,
            memory_mb: ctx.compute.memory_mb,
        },
        environment,
    }
}
