//! # Batch Orchestrator
//!
//! Owns the lifecycle of every batch: start, timer-driven ticks, completion
//! callbacks, phase transitions, finalization, retry with backoff and the
//! administrative reset.
//!
//! ## Serialization
//!
//! Every mutating operation runs under the batch's [`BatchLocks`] entry and
//! the store's [`StoreLock`](crate::state_store::StoreLock) for its whole
//! read-modify-write. The first orders operations inside this process, the
//! second across processes sharing the store. A callback that resolves the
//! last task and a tick that times it out can therefore never both transition
//! the same phase: whichever runs second sees the already-advanced state.
//!
//! ## Persistence
//!
//! State is loaded from the [`StateStore`] at the start of each operation
//! and written back before it returns, on success and failure paths alike.
//! At most one timer per batch is armed through the [`DurableTimer`]; terminal
//! states always clear it. A tick that fails before re-arming leaves the
//! scheduler's lease on the timer in place, so the batch is retried when the
//! lease runs out.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::backoff::BackoffCalculator;
use super::locks::BatchLocks;
use super::transition::apply_transform;
use crate::clients::{ComputeProvisioner, DeliverySink};
use crate::config::{PhasesConfig, PipelineConfig, RetryConfig};
use crate::error::{PipelineError, Result};
use crate::events::{EventPublisher, OrchestrationEvent};
use crate::logging::{log_batch_operation, log_error};
use crate::models::{BatchState, BatchStatusView, BatchSubmission, PhaseRecord};
use crate::phases::{CallbackReport, PhaseContext, PhaseRegistry};
use crate::state_machine::{next_status, BatchEvent, TaskStatus};
use crate::state_store::{DurableTimer, StateStore, StoreLock};

/// Result of [`BatchOrchestrator::start`]
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// A new run was initialised
    Started(BatchStatusView),
    /// A non-error state already existed; nothing changed
    AlreadyStarted(BatchStatusView),
}

impl StartOutcome {
    pub fn view(&self) -> &BatchStatusView {
        match self {
            Self::Started(view) | Self::AlreadyStarted(view) => view,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::Started(_))
    }
}

/// Result of [`BatchOrchestrator::callback`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The result was recorded; `transitioned` is set when it resolved the
    /// phase's last task
    Applied { transitioned: bool },
    /// The task was already completed or failed; nothing changed
    Duplicate,
}

pub struct BatchOrchestrator {
    registry: PhaseRegistry,
    store: Arc<dyn StateStore>,
    timer: Arc<dyn DurableTimer>,
    delivery: Arc<dyn DeliverySink>,
    context: PhaseContext,
    retry: RetryConfig,
    phases: PhasesConfig,
    backoff: BackoffCalculator,
    locks: BatchLocks,
    events: EventPublisher,
}

impl std::fmt::Debug for BatchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOrchestrator")
            .field("registry", &self.registry)
            .field("retry", &self.retry)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl BatchOrchestrator {
    pub fn new(
        registry: PhaseRegistry,
        store: Arc<dyn StateStore>,
        timer: Arc<dyn DurableTimer>,
        delivery: Arc<dyn DeliverySink>,
        provisioner: Arc<dyn ComputeProvisioner>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            registry,
            store,
            timer,
            delivery,
            context: PhaseContext::new(provisioner, config),
            retry: config.retry.clone(),
            phases: config.phases.clone(),
            backoff: BackoffCalculator::from_config(&config.retry),
            locks: BatchLocks::new(),
            events: EventPublisher::default(),
        }
    }

    pub fn with_event_publisher(mut self, events: EventPublisher) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub fn registry(&self) -> &PhaseRegistry {
        &self.registry
    }

    /// Batches with an operation in flight or queued in this process
    pub fn active_batches(&self) -> usize {
        self.locks.len()
    }

    /// Begin a batch from its submission.
    ///
    /// Idempotent: if a non-`ERROR` state already exists for the batch id the
    /// call changes nothing, except re-arming a live batch that lost its
    /// timer. Discovery for the first phase runs synchronously; an empty phase
    /// is transitioned through immediately.
    #[instrument(skip(self, submission), fields(batch_id = %submission.batch_id))]
    pub async fn start(&self, submission: BatchSubmission) -> Result<StartOutcome> {
        submission.validate()?;
        let batch_id = submission.batch_id.clone();
        let _guard = self.locks.acquire(&batch_id).await;
        let store_lock = self.store.lock_batch(&batch_id).await?;

        let result = self.start_locked(submission).await;
        self.release(store_lock, &batch_id).await;
        result
    }

    async fn start_locked(&self, submission: BatchSubmission) -> Result<StartOutcome> {
        let batch_id = submission.batch_id.clone();
        let existing = self.store.get(&batch_id).await?;
        if let Some(existing) = &existing {
            if !existing.status.is_error() {
                debug!(status = %existing.status, "Start ignored, batch already exists");
                if !existing.status.is_terminal() && self.timer.get(&batch_id).await?.is_none() {
                    warn!(status = %existing.status, "Live batch had no timer, re-arming");
                    self.arm(&batch_id, self.retry.initial_delay()).await?;
                }
                return Ok(StartOutcome::AlreadyStarted(existing.status_view()));
            }
            info!("Restarting batch from ERROR");
        }

        let first = self.registry.first().clone();
        let status = next_status(
            existing.as_ref().map(|s| s.status),
            &BatchEvent::Start(first.id()),
        )?;

        let now = Utc::now();
        let submitted = submission.file_count();
        let files = submission.initial_files();
        let mut state = BatchState::new(submission, first.id(), files, now);
        state.status = status;
        state.install_tasks(first.discover(&state.current_file_list));
        self.store.put(&state).await?;

        log_batch_operation(
            "start",
            &batch_id,
            &state.status.to_string(),
            Some(&format!("files={submitted} tasks={}", state.progress.total)),
        );
        self.events.publish(OrchestrationEvent::BatchStarted {
            batch_id: batch_id.clone(),
            phase: first.id(),
            tasks_discovered: state.progress.total,
        });

        if state.current_phase_tasks.is_empty() {
            self.transition(&mut state).await?;
        } else {
            self.arm(&batch_id, self.retry.initial_delay()).await?;
        }

        Ok(StartOutcome::Started(state.status_view()))
    }

    /// Timer fire: dispatch the next slice of the current phase's work
    #[instrument(skip(self))]
    pub async fn tick(&self, batch_id: &str) -> Result<()> {
        let _guard = self.locks.acquire(batch_id).await;
        let store_lock = self.store.lock_batch(batch_id).await?;

        let result = self.tick_locked(batch_id).await;
        self.release(store_lock, batch_id).await;
        result
    }

    async fn tick_locked(&self, batch_id: &str) -> Result<()> {
        let Some(mut state) = self.store.get(batch_id).await? else {
            self.timer.clear(batch_id).await?;
            return Err(PipelineError::batch_not_found(batch_id));
        };

        if state.status.is_terminal() {
            debug!(status = %state.status, "Tick on terminal batch, clearing timer");
            self.timer.clear(batch_id).await?;
            return Ok(());
        }

        let phase = match self.registry.for_status(state.status) {
            Ok(phase) => phase.clone(),
            Err(e) => {
                log_error("orchestrator", "tick", &e.to_string(), Some(batch_id));
                return Err(e);
            }
        };
        let settings = self.phases.for_phase(phase.id());

        match phase.execute_batch(&mut state, settings, &self.context).await {
            Ok(more_work) => {
                state.phase_retry_count = 0;
                state.touch(Utc::now());
                self.store.put(&state).await?;

                self.events.publish(OrchestrationEvent::TasksDispatched {
                    batch_id: batch_id.to_string(),
                    phase: phase.id(),
                    processing: state.count_with_status(TaskStatus::Processing) as u32,
                    pending: state.count_with_status(TaskStatus::Pending) as u32,
                });

                if more_work {
                    self.arm(batch_id, settings.timer_delay()).await
                } else {
                    self.transition(&mut state).await
                }
            }
            Err(error) => self.handle_phase_error(&mut state, error).await,
        }
    }

    /// Apply a remote worker's completion report.
    ///
    /// Transitions immediately when the report resolves the phase's last
    /// task. A report for an already resolved task is a no-op.
    #[instrument(skip(self, report))]
    pub async fn callback(
        &self,
        batch_id: &str,
        task_id: &str,
        report: CallbackReport,
    ) -> Result<CallbackOutcome> {
        let _guard = self.locks.acquire(batch_id).await;
        let store_lock = self.store.lock_batch(batch_id).await?;

        let result = self.callback_locked(batch_id, task_id, report).await;
        self.release(store_lock, batch_id).await;
        result
    }

    async fn callback_locked(
        &self,
        batch_id: &str,
        task_id: &str,
        report: CallbackReport,
    ) -> Result<CallbackOutcome> {
        let mut state = self
            .store
            .get(batch_id)
            .await?
            .ok_or_else(|| PipelineError::batch_not_found(batch_id))?;

        if state.status.is_terminal() {
            return Err(PipelineError::BatchTerminal {
                batch_id: batch_id.to_string(),
                status: state.status.to_string(),
            });
        }

        let task = state
            .current_phase_tasks
            .get(task_id)
            .ok_or_else(|| PipelineError::task_not_found(batch_id, task_id))?;
        if task.is_resolved() {
            warn!(
                task_status = %task.status,
                "Duplicate callback for resolved task ignored"
            );
            return Ok(CallbackOutcome::Duplicate);
        }

        let phase = self.registry.for_status(state.status)?.clone();
        let now = Utc::now();
        phase.handle_callback(task_id, &report, &mut state, now)?;
        state.touch(now);
        self.store.put(&state).await?;

        let succeeded = state
            .current_phase_tasks
            .get(task_id)
            .is_some_and(|t| t.status == TaskStatus::Completed);
        self.events.publish(OrchestrationEvent::TaskResolved {
            batch_id: batch_id.to_string(),
            task_id: task_id.to_string(),
            succeeded,
        });

        if state.all_tasks_resolved() {
            self.transition(&mut state).await?;
            return Ok(CallbackOutcome::Applied { transitioned: true });
        }
        Ok(CallbackOutcome::Applied {
            transitioned: false,
        })
    }

    /// Force a batch into `ERROR` with an operator-supplied reason
    #[instrument(skip(self))]
    pub async fn reset(&self, batch_id: &str, reason: &str) -> Result<BatchStatusView> {
        let _guard = self.locks.acquire(batch_id).await;
        let store_lock = self.store.lock_batch(batch_id).await?;

        let result = self.reset_locked(batch_id, reason).await;
        self.release(store_lock, batch_id).await;
        result
    }

    async fn reset_locked(&self, batch_id: &str, reason: &str) -> Result<BatchStatusView> {
        let mut state = self
            .store
            .get(batch_id)
            .await?
            .ok_or_else(|| PipelineError::batch_not_found(batch_id))?;

        state.status = next_status(Some(state.status), &BatchEvent::Reset(reason.to_string()))?;
        state.error = Some(format!("Reset by operator: {reason}"));
        state.touch(Utc::now());

        self.timer.clear(batch_id).await?;
        self.store.put(&state).await?;

        log_batch_operation("reset", batch_id, &state.status.to_string(), Some(reason));
        self.events.publish(OrchestrationEvent::BatchReset {
            batch_id: batch_id.to_string(),
            reason: reason.to_string(),
        });
        Ok(state.status_view())
    }

    /// Status view read straight from the store
    pub async fn status(&self, batch_id: &str) -> Result<BatchStatusView> {
        self.store
            .get(batch_id)
            .await?
            .map(|state| state.status_view())
            .ok_or_else(|| PipelineError::batch_not_found(batch_id))
    }

    /// Full persisted state, for inspection
    pub async fn load(&self, batch_id: &str) -> Result<Option<BatchState>> {
        self.store.get(batch_id).await
    }

    /// Fold the finished phase's transform over the file list and move to the
    /// next phase, cascading through phases that discover nothing.
    async fn transition(&self, state: &mut BatchState) -> Result<()> {
        loop {
            let phase = self.registry.for_status(state.status)?.clone();
            let now = Utc::now();

            let files_in = state.current_file_list.len();
            let next_files = apply_transform(
                phase.as_ref(),
                &state.current_file_list,
                state.current_phase_tasks.values(),
            );
            state.phase_history.push(PhaseRecord {
                phase: phase.id(),
                counters: state.progress,
                files_in,
                files_out: next_files.len(),
                finished_at: now,
            });
            state.current_file_list = next_files;
            state.install_tasks(Vec::new());
            state.phase_retry_count = 0;
            state.touch(now);

            let Some(next_id) = phase.next_phase() else {
                self.events.publish(OrchestrationEvent::PhaseTransitioned {
                    batch_id: state.batch_id.clone(),
                    from: phase.id(),
                    to: None,
                    files_out: state.current_file_list.len(),
                });
                return self.finalize(state).await;
            };

            let next = self.registry.get(next_id)?.clone();
            state.status = next_status(Some(state.status), &BatchEvent::Advance(next_id))?;
            state.install_tasks(next.discover(&state.current_file_list));
            self.store.put(state).await?;

            log_batch_operation(
                "transition",
                &state.batch_id,
                &state.status.to_string(),
                Some(&format!(
                    "from={} files={} tasks={}",
                    phase.id(),
                    state.current_file_list.len(),
                    state.progress.total
                )),
            );
            self.events.publish(OrchestrationEvent::PhaseTransitioned {
                batch_id: state.batch_id.clone(),
                from: phase.id(),
                to: Some(next_id),
                files_out: state.current_file_list.len(),
            });

            if !state.current_phase_tasks.is_empty() {
                return self.arm(&state.batch_id, self.retry.initial_delay()).await;
            }
            debug!(phase = %next_id, "Phase discovered no tasks, transitioning immediately");
        }
    }

    /// Mark the batch `DONE` and hand the final file list downstream.
    ///
    /// A delivery failure is terminal and never retried.
    async fn finalize(&self, state: &mut BatchState) -> Result<()> {
        let now = Utc::now();
        state.status = next_status(Some(state.status), &BatchEvent::Finalize)?;
        state.completed_at = Some(now);
        state.touch(now);

        match self
            .delivery
            .deliver(&state.batch_id, &state.current_file_list)
            .await
        {
            Ok(()) => {
                log_batch_operation(
                    "finalize",
                    &state.batch_id,
                    &state.status.to_string(),
                    Some(&format!("files={}", state.current_file_list.len())),
                );
                self.events.publish(OrchestrationEvent::BatchFinalized {
                    batch_id: state.batch_id.clone(),
                    file_count: state.current_file_list.len(),
                });
            }
            Err(error) => {
                let message = format!("Finalization delivery failed: {error}");
                state.status = next_status(
                    Some(state.status),
                    &BatchEvent::fail_with_error(message.clone()),
                )?;
                state.error = Some(message.clone());
                log_error("orchestrator", "finalize", &message, Some(&state.batch_id));
                self.events.publish(OrchestrationEvent::BatchErrored {
                    batch_id: state.batch_id.clone(),
                    error: message,
                });
            }
        }

        self.timer.clear(&state.batch_id).await?;
        self.store.put(state).await
    }

    /// Count a failed `execute_batch` and either back off or give up
    async fn handle_phase_error(&self, state: &mut BatchState, error: PipelineError) -> Result<()> {
        state.phase_retry_count += 1;
        state.touch(Utc::now());
        let attempt = state.phase_retry_count;

        if attempt >= self.retry.max_attempts {
            let message = format!(
                "Phase {} failed after {} attempts: {}",
                state.status, attempt, error
            );
            state.status = next_status(
                Some(state.status),
                &BatchEvent::fail_with_error(message.clone()),
            )?;
            state.error = Some(message.clone());

            self.timer.clear(&state.batch_id).await?;
            self.store.put(state).await?;

            log_error("orchestrator", "execute_batch", &message, Some(&state.batch_id));
            self.events.publish(OrchestrationEvent::BatchErrored {
                batch_id: state.batch_id.clone(),
                error: message,
            });
            return Ok(());
        }

        let delay = self.backoff.delay_for(attempt);
        self.store.put(state).await?;
        self.arm(&state.batch_id, delay).await?;

        warn!(
            batch_id = %state.batch_id,
            attempt = attempt,
            max_attempts = self.retry.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Phase execution failed, retry scheduled"
        );
        self.events.publish(OrchestrationEvent::RetryScheduled {
            batch_id: state.batch_id.clone(),
            attempt,
            delay_ms: delay.as_millis() as u64,
        });
        Ok(())
    }

    async fn release(&self, store_lock: Box<dyn StoreLock>, batch_id: &str) {
        if let Err(e) = store_lock.release().await {
            log_error("orchestrator", "release_store_lock", &e.to_string(), Some(batch_id));
        }
    }

    async fn arm(&self, batch_id: &str, delay: std::time::Duration) -> Result<()> {
        let delay = chrono::Duration::from_std(delay).map_err(|e| {
            PipelineError::PhaseExecution(format!("timer delay out of range: {e}"))
        })?;
        self.timer.set(batch_id, Utc::now() + delay).await
    }
}
