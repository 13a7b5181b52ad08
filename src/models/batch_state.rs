use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::file::ProcessableFile;
use super::submission::BatchSubmission;
use super::task::Task;
use crate::state_machine::{BatchStatus, PhaseId, TaskStatus};

/// Progress counters for the active phase, reset at every transition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCounters {
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
}

impl ProgressCounters {
    pub fn resolved(&self) -> u32 {
        self.completed + self.failed
    }
}

/// Summary of a finished phase, kept after its tasks are discarded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: PhaseId,
    pub counters: ProgressCounters,
    pub files_in: usize,
    pub files_out: usize,
    pub finished_at: DateTime<Utc>,
}

/// Root aggregate persisted as a whole on every mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchState {
    pub batch_id: String,
    pub status: BatchStatus,
    /// Original submission, kept verbatim
    pub submission: BatchSubmission,
    pub current_file_list: Vec<ProcessableFile>,
    /// Tasks of the active phase only, keyed by task id
    pub current_phase_tasks: BTreeMap<String, Task>,
    pub progress: ProgressCounters,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Consecutive phase-execution failures
    pub phase_retry_count: u32,
    #[serde(default)]
    pub phase_history: Vec<PhaseRecord>,
}

impl BatchState {
    pub fn new(
        submission: BatchSubmission,
        first_phase: PhaseId,
        files: Vec<ProcessableFile>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            batch_id: submission.batch_id.clone(),
            status: BatchStatus::Phase(first_phase),
            submission,
            current_file_list: files,
            current_phase_tasks: BTreeMap::new(),
            progress: ProgressCounters::default(),
            started_at: now,
            updated_at: now,
            completed_at: None,
            error: None,
            phase_retry_count: 0,
            phase_history: Vec::new(),
        }
    }

    /// Replace the task map with a freshly discovered phase's tasks
    pub fn install_tasks(&mut self, tasks: Vec<Task>) {
        self.current_phase_tasks = tasks
            .into_iter()
            .map(|task| (task.task_id.clone(), task))
            .collect();
        self.progress = ProgressCounters {
            total: self.current_phase_tasks.len() as u32,
            completed: 0,
            failed: 0,
        };
    }

    pub fn record_completed(&mut self) {
        self.progress.completed += 1;
        debug_assert!(self.progress.resolved() <= self.progress.total);
    }

    pub fn record_failed(&mut self) {
        self.progress.failed += 1;
        debug_assert!(self.progress.resolved() <= self.progress.total);
    }

    /// Every task of the active phase is completed or failed
    pub fn all_tasks_resolved(&self) -> bool {
        self.current_phase_tasks.values().all(Task::is_resolved)
    }

    pub fn count_with_status(&self, status: TaskStatus) -> usize {
        self.current_phase_tasks
            .values()
            .filter(|t| t.status == status)
            .count()
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    /// Read-only projection served by the status query
    pub fn status_view(&self) -> BatchStatusView {
        BatchStatusView {
            batch_id: self.batch_id.clone(),
            status: self.status,
            tasks_total: self.progress.total,
            tasks_completed: self.progress.completed,
            tasks_failed: self.progress.failed,
            tasks_pending: self.count_with_status(TaskStatus::Pending) as u32,
            tasks_processing: self.count_with_status(TaskStatus::Processing) as u32,
            file_count: self.current_file_list.len(),
            phase_retry_count: self.phase_retry_count,
            started_at: self.started_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
            error: self.error.clone(),
        }
    }
}

/// Status query response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStatusView {
    pub batch_id: String,
    pub status: BatchStatus,
    pub tasks_total: u32,
    pub tasks_completed: u32,
    pub tasks_failed: u32,
    pub tasks_pending: u32,
    pub tasks_processing: u32,
    pub file_count: usize,
    pub phase_retry_count: u32,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::TaskPayload;
    use crate::phases::processing::ProcessingPayload;

    fn state() -> BatchState {
        BatchState::new(
            BatchSubmission {
                batch_id: "batch-1".to_string(),
                directories: vec![],
            },
            PhaseId::Processing,
            vec![],
            Utc::now(),
        )
    }

    fn task(key: &str) -> Task {
        Task::new(
            key,
            TaskPayload::Processing(ProcessingPayload {
                input_name: key.to_string(),
                input_content_type: "image/jpeg".to_string(),
                processing_config: serde_json::Value::Null,
                output: None,
            }),
        )
    }

    #[test]
    fn test_install_tasks_resets_counters() {
        let mut state = state();
        state.install_tasks(vec![task("a"), task("b")]);
        state.record_completed();
        assert_eq!(state.progress.completed, 1);

        state.install_tasks(vec![task("c")]);
        assert_eq!(state.progress, ProgressCounters { total: 1, completed: 0, failed: 0 });
        assert_eq!(state.current_phase_tasks.len(), 1);
    }

    #[test]
    fn test_empty_task_map_counts_as_resolved() {
        let state = state();
        assert!(state.all_tasks_resolved());
    }

    #[test]
    fn test_status_view_reflects_counts() {
        let mut state = state();
        state.install_tasks(vec![task("a"), task("b"), task("c")]);
        let now = Utc::now();
        let id = task("a").task_id;
        state
            .current_phase_tasks
            .get_mut(&id)
            .unwrap()
            .mark_processing("inst", now);

        let view = state.status_view();
        assert_eq!(view.status, BatchStatus::Phase(PhaseId::Processing));
        assert_eq!(view.tasks_total, 3);
        assert_eq!(view.tasks_pending, 2);
        assert_eq!(view.tasks_processing, 1);
    }
}
