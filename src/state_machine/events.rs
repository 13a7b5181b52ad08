use serde::{Deserialize, Serialize};

use super::states::{BatchStatus, PhaseId};

/// Events that can trigger batch status transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BatchEvent {
    /// Begin (or re-begin after ERROR) with the first registered phase
    Start(PhaseId),
    /// Current phase finished; move to the named next phase
    Advance(PhaseId),
    /// End of the phase chain reached
    Finalize,
    /// Terminal failure with a message
    Fail(String),
    /// Operator-forced failure with a reason
    Reset(String),
}

impl BatchEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start(_) => "start",
            Self::Advance(_) => "advance",
            Self::Finalize => "finalize",
            Self::Fail(_) => "fail",
            Self::Reset(_) => "reset",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) | Self::Reset(msg) => Some(msg),
            _ => None,
        }
    }

    /// Create a failure event with the given error message
    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}

/// Rejected transition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid transition from {from} on event '{event}'")]
pub struct InvalidTransition {
    pub from: String,
    pub event: &'static str,
}

/// Resolve the status an event leads to from `current` (`None` for a batch
/// with no persisted state yet).
pub fn next_status(
    current: Option<BatchStatus>,
    event: &BatchEvent,
) -> Result<BatchStatus, InvalidTransition> {
    let rejected = || InvalidTransition {
        from: current.map_or_else(|| "<none>".to_string(), |s| s.to_string()),
        event: event.event_type(),
    };

    match (current, event) {
        (None | Some(BatchStatus::Error), BatchEvent::Start(first)) => {
            Ok(BatchStatus::Phase(*first))
        }
        (Some(BatchStatus::Phase(_)), BatchEvent::Advance(next)) => Ok(BatchStatus::Phase(*next)),
        (Some(BatchStatus::Phase(_)), BatchEvent::Finalize) => Ok(BatchStatus::Done),
        // DONE -> ERROR covers a failed downstream delivery during finalization
        (Some(BatchStatus::Phase(_) | BatchStatus::Done), BatchEvent::Fail(_)) => {
            Ok(BatchStatus::Error)
        }
        (Some(_), BatchEvent::Reset(_)) => Ok(BatchStatus::Error),
        _ => Err(rejected()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_only_from_empty_or_error() {
        let start = BatchEvent::Start(PhaseId::Conversion);
        assert_eq!(
            next_status(None, &start).unwrap(),
            BatchStatus::Phase(PhaseId::Conversion)
        );
        assert_eq!(
            next_status(Some(BatchStatus::Error), &start).unwrap(),
            BatchStatus::Phase(PhaseId::Conversion)
        );
        assert!(next_status(Some(BatchStatus::Done), &start).is_err());
        assert!(next_status(Some(BatchStatus::Phase(PhaseId::Processing)), &start).is_err());
    }

    #[test]
    fn test_terminal_states_reject_progress() {
        assert!(next_status(Some(BatchStatus::Done), &BatchEvent::Finalize).is_err());
        assert!(
            next_status(Some(BatchStatus::Error), &BatchEvent::Advance(PhaseId::Processing))
                .is_err()
        );
        assert!(next_status(Some(BatchStatus::Error), &BatchEvent::fail_with_error("x")).is_err());
    }

    #[test]
    fn test_delivery_failure_and_reset_reach_error() {
        assert_eq!(
            next_status(Some(BatchStatus::Done), &BatchEvent::fail_with_error("HTTP 500")).unwrap(),
            BatchStatus::Error
        );
        assert_eq!(
            next_status(Some(BatchStatus::Done), &BatchEvent::Reset("manual".into())).unwrap(),
            BatchStatus::Error
        );
        assert!(next_status(None, &BatchEvent::Reset("manual".into())).is_err());
    }

    #[test]
    fn test_event_helpers() {
        let event = BatchEvent::Reset("operator".into());
        assert_eq!(event.event_type(), "reset");
        assert_eq!(event.error_message(), Some("operator"));
        assert_eq!(BatchEvent::Finalize.error_message(), None);
    }
}
