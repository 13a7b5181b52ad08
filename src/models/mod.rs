pub mod batch_state;
pub mod file;
pub mod submission;
pub mod task;

// Re-export core models for easy access
pub use batch_state::{BatchState, BatchStatusView, PhaseRecord, ProgressCounters};
pub use file::ProcessableFile;
pub use submission::{BatchSubmission, DirectoryGroup, SubmittedFile};
pub use task::{task_id_for, CallbackTiming, Task, TaskPayload};
