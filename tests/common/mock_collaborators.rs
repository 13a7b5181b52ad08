//! In-process stand-ins for the compute provisioner, the delivery sink, a
//! state store with scripted faults and a phase whose dispatch step can be
//! made to fail.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pipeline_core::clients::{ComputeProvisioner, DeliverySink, InstanceHandle, ProvisionRequest};
use pipeline_core::config::PhaseSettings;
use pipeline_core::error::{PipelineError, Result};
use pipeline_core::models::{BatchState, ProcessableFile, Task};
use pipeline_core::phases::{CallbackReport, ConversionPhase, Phase, PhaseContext};
use pipeline_core::state_machine::PhaseId;
use pipeline_core::state_store::{MemoryStateStore, StateStore, StoreLock};

/// Records every provisioning request; can reject all or selected inputs
#[derive(Debug, Default)]
pub struct RecordingProvisioner {
    requests: Mutex<Vec<ProvisionRequest>>,
    reject_all: AtomicBool,
    rejected_keys: Mutex<HashSet<String>>,
    counter: AtomicUsize,
}

impl RecordingProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_all(&self, reject: bool) {
        self.reject_all.store(reject, Ordering::SeqCst);
    }

    pub fn reject_key(&self, input_key: &str) {
        self.rejected_keys
            .lock()
            .unwrap()
            .insert(input_key.to_string());
    }

    pub fn requests(&self) -> Vec<ProvisionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ComputeProvisioner for RecordingProvisioner {
    async fn provision(&self, request: ProvisionRequest) -> Result<InstanceHandle> {
        let task_id = request.environment.get("TASK_ID").cloned().unwrap_or_default();
        let input_key = request.environment.get("INPUT_KEY").cloned().unwrap_or_default();
        self.requests.lock().unwrap().push(request);

        if self.reject_all.load(Ordering::SeqCst)
            || self.rejected_keys.lock().unwrap().contains(&input_key)
        {
            return Err(PipelineError::dispatch_failed(task_id, "HTTP 503: no capacity"));
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(InstanceHandle {
            instance_id: format!("instance-{n}"),
        })
    }
}

/// Records deliveries; fails every delivery while `fail` is set
#[derive(Debug, Default)]
pub struct ScriptedDelivery {
    deliveries: Mutex<Vec<(String, Vec<ProcessableFile>)>>,
    fail: AtomicBool,
}

impl ScriptedDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn deliveries(&self) -> Vec<(String, Vec<ProcessableFile>)> {
        self.deliveries.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliverySink for ScriptedDelivery {
    async fn deliver(&self, batch_id: &str, files: &[ProcessableFile]) -> Result<()> {
        self.deliveries
            .lock()
            .unwrap()
            .push((batch_id.to_string(), files.to_vec()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(PipelineError::delivery_failed(batch_id, "HTTP 502: upstream unavailable"));
        }
        Ok(())
    }
}

/// Conversion phase whose `execute_batch` fails a scripted number of times
#[derive(Debug, Default)]
pub struct FlakyConversionPhase {
    failures_remaining: AtomicU32,
    executions: AtomicU32,
}

impl FlakyConversionPhase {
    pub fn failing(times: u32) -> Self {
        Self {
            failures_remaining: AtomicU32::new(times),
            executions: AtomicU32::new(0),
        }
    }

    pub fn executions(&self) -> u32 {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Phase for FlakyConversionPhase {
    fn id(&self) -> PhaseId {
        ConversionPhase.id()
    }

    fn discover(&self, files: &[ProcessableFile]) -> Vec<Task> {
        ConversionPhase.discover(files)
    }

    fn provision_request(
        &self,
        task: &Task,
        batch_id: &str,
        ctx: &PhaseContext,
    ) -> Result<ProvisionRequest> {
        ConversionPhase.provision_request(task, batch_id, ctx)
    }

    async fn execute_batch(
        &self,
        state: &mut BatchState,
        settings: &PhaseSettings,
        ctx: &PhaseContext,
    ) -> Result<bool> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(PipelineError::PhaseExecution(
                "compute API credentials rejected".to_string(),
            ));
        }
        pipeline_core::phases::dispatch::execute_batch(self, state, settings, ctx).await
    }

    fn handle_callback(
        &self,
        task_id: &str,
        report: &CallbackReport,
        state: &mut BatchState,
        now: DateTime<Utc>,
    ) -> Result<()> {
        ConversionPhase.handle_callback(task_id, report, state, now)
    }

    fn transform_file(&self, file: &ProcessableFile, task: Option<&Task>) -> Vec<ProcessableFile> {
        ConversionPhase.transform_file(file, task)
    }

    fn next_phase(&self) -> Option<PhaseId> {
        ConversionPhase.next_phase()
    }
}

/// Memory store that can fail the next reads or writes and audits its
/// per-batch locks
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: Arc<MemoryStateStore>,
    failing_gets: AtomicU32,
    failing_puts: AtomicU32,
    locks: Arc<LockAudit>,
}

#[derive(Debug, Default)]
pub struct LockAudit {
    held: Mutex<HashSet<String>>,
    acquired: AtomicUsize,
    released: AtomicUsize,
    overlaps: AtomicUsize,
}

impl FaultyStore {
    pub fn wrapping(inner: Arc<MemoryStateStore>) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn fail_next_gets(&self, times: u32) {
        self.failing_gets.store(times, Ordering::SeqCst);
    }

    pub fn fail_next_puts(&self, times: u32) {
        self.failing_puts.store(times, Ordering::SeqCst);
    }

    pub fn locks_acquired(&self) -> usize {
        self.locks.acquired.load(Ordering::SeqCst)
    }

    pub fn locks_released(&self) -> usize {
        self.locks.released.load(Ordering::SeqCst)
    }

    /// Times a batch was locked while already held
    pub fn lock_overlaps(&self) -> usize {
        self.locks.overlaps.load(Ordering::SeqCst)
    }

    fn take_fault(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl StateStore for FaultyStore {
    async fn get(&self, batch_id: &str) -> Result<Option<BatchState>> {
        if Self::take_fault(&self.failing_gets) {
            return Err(PipelineError::storage("get", "connection reset by peer"));
        }
        self.inner.get(batch_id).await
    }

    async fn put(&self, state: &BatchState) -> Result<()> {
        if Self::take_fault(&self.failing_puts) {
            return Err(PipelineError::storage("put", "connection reset by peer"));
        }
        self.inner.put(state).await
    }

    async fn lock_batch(&self, batch_id: &str) -> Result<Box<dyn StoreLock>> {
        self.locks.acquired.fetch_add(1, Ordering::SeqCst);
        if !self.locks.held.lock().unwrap().insert(batch_id.to_string()) {
            self.locks.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        Ok(Box::new(AuditedLock {
            audit: self.locks.clone(),
            batch_id: batch_id.to_string(),
        }))
    }
}

struct AuditedLock {
    audit: Arc<LockAudit>,
    batch_id: String,
}

#[async_trait]
impl StoreLock for AuditedLock {
    async fn release(self: Box<Self>) -> Result<()> {
        self.audit.held.lock().unwrap().remove(&self.batch_id);
        self.audit.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
