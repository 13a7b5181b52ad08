//! # Event Publisher
//!
//! Fire-and-forget broadcast of [`OrchestrationEvent`]s. Publishing never
//! blocks the orchestrator and succeeds with no subscribers attached.
//!
//! ```rust
//! use pipeline_core::events::{EventPublisher, OrchestrationEvent};
//!
//! # tokio_test::block_on(async {
//! let publisher = EventPublisher::default();
//! let mut events = publisher.subscribe();
//!
//! publisher.publish(OrchestrationEvent::BatchFinalized {
//!     batch_id: "batch-1".to_string(),
//!     file_count: 3,
//! });
//!
//! let published = events.recv().await.unwrap();
//! assert_eq!(published.event.name(), "batch.finalized");
//! # });
//! ```

use tokio::sync::broadcast;

use super::types::OrchestrationEvent;

/// Broadcast publisher for batch lifecycle events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub event: OrchestrationEvent,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: OrchestrationEvent) {
        tracing::trace!(event = event.name(), batch_id = %event.batch_id(), "Publishing event");
        let _ = self.sender.send(PublishedEvent {
            event,
            published_at: chrono::Utc::now(),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let publisher = EventPublisher::new(8);
        publisher.publish(OrchestrationEvent::BatchReset {
            batch_id: "b".into(),
            reason: "operator".into(),
        });
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events_in_order() {
        let publisher = EventPublisher::new(8);
        let mut rx = publisher.subscribe();

        publisher.publish(OrchestrationEvent::BatchFinalized {
            batch_id: "b".into(),
            file_count: 3,
        });
        publisher.publish(OrchestrationEvent::BatchErrored {
            batch_id: "b".into(),
            error: "delivery".into(),
        });

        assert_eq!(rx.recv().await.unwrap().event.name(), "batch.finalized");
        assert_eq!(rx.recv().await.unwrap().event.name(), "batch.errored");
    }
}
