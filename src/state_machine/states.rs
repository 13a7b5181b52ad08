use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a registered processing phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseId {
    /// First stage: camera/raw formats converted to a web-friendly format
    Conversion,
    /// Second stage: image processing and delivery-service registration
    Processing,
}

impl PhaseId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversion => "CONVERSION",
            Self::Processing => "PROCESSING",
        }
    }

    /// Provenance tag stamped on files this phase produces
    pub fn produced_by_tag(&self) -> String {
        format!("produced-by:{}", self.as_str())
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PhaseId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONVERSION" => Ok(Self::Conversion),
            "PROCESSING" => Ok(Self::Processing),
            _ => Err(format!("Invalid phase id: {s}")),
        }
    }
}

/// Batch status: the active phase, or one of the two terminal states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum BatchStatus {
    /// Batch is working through the named phase
    Phase(PhaseId),
    /// Final file list was delivered downstream
    Done,
    /// Batch failed terminally or was reset by an operator
    Error,
}

impl BatchStatus {
    /// Check if this is a terminal state (no timers, no further work)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    /// The active phase, if the batch is not terminal
    pub fn phase(&self) -> Option<PhaseId> {
        match self {
            Self::Phase(phase) => Some(*phase),
            _ => None,
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Phase(phase) => write!(f, "{phase}"),
            Self::Done => write!(f, "DONE"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DONE" => Ok(Self::Done),
            "ERROR" => Ok(Self::Error),
            other => other
                .parse::<PhaseId>()
                .map(Self::Phase)
                .map_err(|_| format!("Invalid batch status: {other}")),
        }
    }
}

impl From<BatchStatus> for String {
    fn from(status: BatchStatus) -> Self {
        status.to_string()
    }
}

impl TryFrom<String> for BatchStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        value.parse()
    }
}

/// Lifecycle of one unit of remote work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Discovered, not yet (successfully) dispatched
    #[default]
    Pending,
    /// Dispatched to a remote instance, awaiting callback
    Processing,
    /// Remote worker reported success
    Completed,
    /// Remote worker reported an error, or the task timed out
    Failed,
}

impl TaskStatus {
    /// Completed or failed; nothing further will happen to the task
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Processing)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_status_terminal_check() {
        assert!(BatchStatus::Done.is_terminal());
        assert!(BatchStatus::Error.is_terminal());
        assert!(!BatchStatus::Phase(PhaseId::Conversion).is_terminal());
        assert_eq!(
            BatchStatus::Phase(PhaseId::Processing).phase(),
            Some(PhaseId::Processing)
        );
        assert_eq!(BatchStatus::Done.phase(), None);
    }

    #[test]
    fn test_task_status_resolution() {
        assert!(TaskStatus::Completed.is_resolved());
        assert!(TaskStatus::Failed.is_resolved());
        assert!(!TaskStatus::Pending.is_resolved());
        assert!(!TaskStatus::Processing.is_resolved());
    }

    #[test]
    fn test_status_string_conversion() {
        assert_eq!(BatchStatus::Phase(PhaseId::Conversion).to_string(), "CONVERSION");
        assert_eq!("DONE".parse::<BatchStatus>().unwrap(), BatchStatus::Done);
        assert_eq!(
            "PROCESSING".parse::<BatchStatus>().unwrap(),
            BatchStatus::Phase(PhaseId::Processing)
        );
        assert!("RUNNING".parse::<BatchStatus>().is_err());
    }

    #[test]
    fn test_status_try_from_string() {
        assert_eq!(BatchStatus::try_from("ERROR".to_string()), Ok(BatchStatus::Error));
        assert_eq!(
            BatchStatus::try_from("CONVERSION".to_string()),
            Ok(BatchStatus::Phase(PhaseId::Conversion))
        );
        assert!(BatchStatus::try_from("RUNNING".to_string()).is_err());
        assert_eq!(String::from(BatchStatus::Done), "DONE");
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&BatchStatus::Phase(PhaseId::Conversion)).unwrap();
        assert_eq!(json, "\"CONVERSION\"");
        let parsed: BatchStatus = serde_json::from_str("\"ERROR\"").unwrap();
        assert_eq!(parsed, BatchStatus::Error);

        let json = serde_json::to_string(&TaskStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }
}
