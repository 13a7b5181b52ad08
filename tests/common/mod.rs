//! Shared fixtures for integration tests: mock collaborators, builders and a
//! harness wiring an orchestrator to in-memory stores.

#![allow(dead_code)]

pub mod builders;
pub mod mock_collaborators;

use std::sync::Arc;

use pipeline_core::config::PipelineConfig;
use pipeline_core::models::BatchState;
use pipeline_core::orchestration::BatchOrchestrator;
use pipeline_core::phases::PhaseRegistry;
use pipeline_core::state_store::{MemoryStateStore, MemoryTimer};

use mock_collaborators::{FaultyStore, RecordingProvisioner, ScriptedDelivery};

/// Orchestrator plus handles on every collaborator it was built with
pub struct Harness {
    pub orchestrator: Arc<BatchOrchestrator>,
    pub store: Arc<MemoryStateStore>,
    /// The store the orchestrator actually talks to, wrapping `store`
    pub faults: Arc<FaultyStore>,
    pub timer: Arc<MemoryTimer>,
    pub provisioner: Arc<RecordingProvisioner>,
    pub delivery: Arc<ScriptedDelivery>,
    pub config: PipelineConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(builders::fast_config())
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        Self::with_registry(PhaseRegistry::standard().expect("standard registry"), config)
    }

    pub fn with_registry(registry: PhaseRegistry, config: PipelineConfig) -> Self {
        let store = Arc::new(MemoryStateStore::new());
        let faults = Arc::new(FaultyStore::wrapping(store.clone()));
        let timer = Arc::new(MemoryTimer::new());
        let provisioner = Arc::new(RecordingProvisioner::new());
        let delivery = Arc::new(ScriptedDelivery::new());

        let orchestrator = Arc::new(BatchOrchestrator::new(
            registry,
            faults.clone(),
            timer.clone(),
            delivery.clone(),
            provisioner.clone(),
            &config,
        ));

        Self {
            orchestrator,
            store,
            faults,
            timer,
            provisioner,
            delivery,
            config,
        }
    }

    pub async fn state(&self, batch_id: &str) -> BatchState {
        self.orchestrator
            .load(batch_id)
            .await
            .expect("load state")
            .expect("batch exists")
    }

    pub async fn timer_armed(&self, batch_id: &str) -> bool {
        use pipeline_core::state_store::DurableTimer;
        self.timer.get(batch_id).await.expect("timer lookup").is_some()
    }
}
