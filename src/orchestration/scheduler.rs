//! # Timer Scheduler
//!
//! Background loop that turns due durable timers into orchestrator ticks.
//!
//! ## Lifecycle
//!
//! - Created by the server binary once the orchestrator is built
//! - Started via `run()`, usually inside `tokio::spawn`
//! - Stops when the shutdown watch channel flips to `true`
//!
//! Due timers are leased rather than removed before the tick runs: the timer
//! is pushed `timer_lease_ms` into the future. A tick that completes re-arms
//! or clears it; a tick that fails, or a process that dies mid-tick, leaves
//! the lease behind and the batch is ticked again once it expires.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use super::orchestrator::BatchOrchestrator;
use crate::config::SchedulerConfig;
use crate::error::{PipelineError, Result};
use crate::state_store::DurableTimer;

#[derive(Clone)]
pub struct TimerScheduler {
    orchestrator: Arc<BatchOrchestrator>,
    timer: Arc<dyn DurableTimer>,
    config: SchedulerConfig,
}

impl std::fmt::Debug for TimerScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerScheduler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TimerScheduler {
    #[must_use]
    pub fn new(
        orchestrator: Arc<BatchOrchestrator>,
        timer: Arc<dyn DurableTimer>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            orchestrator,
            timer,
            config,
        }
    }

    /// Poll until `shutdown` becomes `true`.
    ///
    /// Failures of a single poll or a single tick are logged and do not stop
    /// the loop.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut poll = interval(self.config.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_due_per_poll = self.config.max_due_per_poll,
            timer_lease_ms = self.config.timer_lease_ms,
            "Starting timer scheduler"
        );

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if let Err(e) = self.poll_once().await {
                        error!(error = %e, "Timer poll failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Timer scheduler shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Fire every due timer once. Returns the number of ticks run.
    pub async fn poll_once(&self) -> Result<usize> {
        let lease = chrono::Duration::from_std(self.config.timer_lease()).map_err(|e| {
            PipelineError::PhaseExecution(format!("timer lease out of range: {e}"))
        })?;
        let now = Utc::now();
        let due = self
            .timer
            .take_due(now, now + lease, self.config.max_due_per_poll)
            .await?;
        if due.is_empty() {
            return Ok(0);
        }

        debug!(count = due.len(), "Firing due timers");
        let ticks = due.iter().map(|batch_id| async move {
            if let Err(e) = self.orchestrator.tick(batch_id).await {
                error!(batch_id = %batch_id, error = %e, "Tick failed");
            }
        });
        futures::future::join_all(ticks).await;
        Ok(due.len())
    }
}
