//! # Phase Registry
//!
//! Ordered, constructed-once list of phases. The first entry is the initial
//! state of every batch; `next_phase` links must point at registered phases
//! and must not loop.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use super::{ConversionPhase, Phase, ProcessingPhase};
use crate::config::ConfigurationError;
use crate::error::{PipelineError, Result};
use crate::state_machine::{BatchStatus, PhaseId};

#[derive(Clone)]
pub struct PhaseRegistry {
    phases: Vec<Arc<dyn Phase>>,
}

impl std::fmt::Debug for PhaseRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseRegistry")
            .field("phases", &self.ids())
            .finish()
    }
}

impl PhaseRegistry {
    /// Build a registry from phases in chain order
    pub fn new(phases: Vec<Arc<dyn Phase>>) -> Result<Self> {
        if phases.is_empty() {
            return Err(invalid("phases", "[]", "at least one phase is required"));
        }

        let mut seen = HashSet::new();
        for phase in &phases {
            if !seen.insert(phase.id()) {
                return Err(invalid("phases", phase.id(), "phase registered twice"));
            }
        }

        for phase in &phases {
            if let Some(next) = phase.next_phase() {
                if !seen.contains(&next) {
                    return Err(invalid(
                        "next_phase",
                        next,
                        format!("phase {} points at an unregistered phase", phase.id()),
                    ));
                }
            }
        }

        let registry = Self { phases };
        registry.check_chain_terminates()?;

        info!(phases = ?registry.ids(), "Phase registry constructed");
        Ok(registry)
    }

    /// CONVERSION → PROCESSING
    pub fn standard() -> Result<Self> {
        Self::new(vec![Arc::new(ConversionPhase), Arc::new(ProcessingPhase)])
    }

    pub fn first(&self) -> &Arc<dyn Phase> {
        // non-empty by construction
        &self.phases[0]
    }

    pub fn get(&self, id: PhaseId) -> Result<&Arc<dyn Phase>> {
        self.phases
            .iter()
            .find(|phase| phase.id() == id)
            .ok_or_else(|| PipelineError::PhaseNotRegistered {
                status: id.to_string(),
            })
    }

    /// Resolve the phase driving a batch in `status`
    pub fn for_status(&self, status: BatchStatus) -> Result<&Arc<dyn Phase>> {
        match status.phase() {
            Some(id) => self.get(id),
            None => Err(PipelineError::PhaseNotRegistered {
                status: status.to_string(),
            }),
        }
    }

    pub fn ids(&self) -> Vec<PhaseId> {
        self.phases.iter().map(|phase| phase.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    fn check_chain_terminates(&self) -> Result<()> {
        let mut visited = HashSet::new();
        let mut current = Some(self.first().id());
        while let Some(id) = current {
            if !visited.insert(id) {
                return Err(invalid("next_phase", id, "phase chain contains a cycle"));
            }
            current = self.get(id)?.next_phase();
        }
        Ok(())
    }
}

fn invalid(field: &str, value: impl ToString, context: impl Into<String>) -> PipelineError {
    PipelineError::Configuration(ConfigurationError::invalid_value(field, value, context))
}
