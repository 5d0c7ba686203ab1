//! Event bus for engine observability
//!
//! Pub/sub over a Tokio broadcast channel. Publishing never blocks and
//! never fails: with no subscribers the event is dropped, and slow
//! subscribers observe `RecvError::Lagged` rather than stalling the engine.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use super::types::EngineEvent;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 1024;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Event bus with broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: EngineEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "Event published"),
            Err(_) => debug!(event_type, "Event published (no receivers)"),
        }
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub network_id: Option<String>,
    pub downtime_id: Option<String>,
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a new empty filter (matches all events)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn network(mut self, network_id: &str) -> Self {
        self.network_id = Some(network_id.to_string());
        self
    }

    pub fn downtime(mut self, downtime_id: &str) -> Self {
        self.downtime_id = Some(downtime_id.to_string());
        self
    }

    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    /// Check if an event matches this filter
    pub fn matches(&self, event: &EngineEvent) -> bool {
        if let Some(ref nid) = self.network_id {
            if event.network_id() != nid {
                return false;
            }
        }

        // Events without a downtime never match a downtime filter
        if let Some(ref did) = self.downtime_id {
            if event.downtime_id() != Some(did.as_str()) {
                return false;
            }
        }

        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }

        true
    }
}

/// Filtered event receiver that only yields matching events
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<EngineEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<EngineEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<EngineEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

/// Extension trait for subscribing with filters
pub trait EventBusExt {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver;
}

impl EventBusExt for EventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

impl EventBusExt for SharedEventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LinkStatus;
    use chrono::Utc;

    fn opened(network_id: &str, downtime_id: &str) -> EngineEvent {
        EngineEvent::DowntimeOpened {
            network_id: network_id.to_string(),
            downtime_id: downtime_id.to_string(),
            opened_by: LinkStatus::Down,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new().shared();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(opened("net-1", "dt-1"));

        assert_eq!(rx1.recv().await.unwrap().event_type(), "downtime_opened");
        assert_eq!(rx2.recv().await.unwrap().event_type(), "downtime_opened");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        bus.publish(opened("net-1", "dt-1"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_filter() {
        let filter = EventFilter::new()
            .network("net-1")
            .types(vec!["downtime_opened", "downtime_resolved"]);

        let transition = EngineEvent::TransitionDetected {
            network_id: "net-1".to_string(),
            from: LinkStatus::Up,
            to: LinkStatus::Down,
            timestamp: Utc::now(),
        };

        assert!(filter.matches(&opened("net-1", "dt-1")));
        assert!(!filter.matches(&opened("net-2", "dt-2")));
        assert!(!filter.matches(&transition));

        let by_downtime = EventFilter::new().downtime("dt-1");
        assert!(by_downtime.matches(&opened("net-1", "dt-1")));
        assert!(!by_downtime.matches(&transition));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let bus = EventBus::new();
        let mut filtered = bus.subscribe_filtered(EventFilter::new().downtime("target"));

        bus.publish(opened("net-1", "other"));
        bus.publish(opened("net-1", "target"));

        let event = filtered.recv().await.unwrap();
        assert_eq!(event.downtime_id(), Some("target"));
    }
}
