// State machine module for batch orchestration
//
// Batch status (active phase, DONE, ERROR) and task status definitions, plus
// the guarded transition table the orchestrator applies.

pub mod events;
pub mod states;

pub use events::{next_status, BatchEvent, InvalidTransition};
pub use states::{BatchStatus, PhaseId, TaskStatus};
