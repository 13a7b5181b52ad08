//! # Orchestration
//!
//! The batch orchestrator and the pieces it is built from: the transition
//! fold, retry backoff, per-batch locks and the durable timer scheduler.

pub mod backoff;
pub mod locks;
pub mod orchestrator;
pub mod scheduler;
pub mod transition;

pub use backoff::BackoffCalculator;
pub use locks::BatchLocks;
pub use orchestrator::{BatchOrchestrator, CallbackOutcome, StartOutcome};
pub use scheduler::TimerScheduler;
pub use transition::apply_transform;
