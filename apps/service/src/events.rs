use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::database::models::{Heartbeat, SslInfo};
use crate::monitoring::status::Transition;
use crate::monitoring::types::{MonitorStatus, MonitorType};
use crate::orchestrator::projection::MonitorOverview;

const BUS_CAPACITY: usize = 256;

/// Live update published by the engine
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "topic", content = "payload", rename_all = "snake_case")]
pub enum EngineEvent {
    Heartbeat { user_id: i64, monitor_id: i64, monitor_type: MonitorType, heartbeat: Heartbeat },
    StatusChanged { user_id: i64, monitor_id: i64, name: String, transition: Transition },
    SslChecked { user_id: i64, monitor_id: i64, status: MonitorStatus, info: Option<SslInfo> },
    MonitorsUpdated { user_id: i64, monitors: Vec<MonitorOverview> },
}

impl EngineEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            EngineEvent::Heartbeat { .. } => "heartbeat",
            EngineEvent::StatusChanged { .. } => "status_changed",
            EngineEvent::SslChecked { .. } => "ssl_checked",
            EngineEvent::MonitorsUpdated { .. } => "monitors_updated",
        }
    }

    /// Owner of the monitor or projection the event is about
    pub fn user_id(&self) -> i64 {
        match self {
            EngineEvent::Heartbeat { user_id, .. }
            | EngineEvent::StatusChanged { user_id, .. }
            | EngineEvent::SslChecked { user_id, .. }
            | EngineEvent::MonitorsUpdated { user_id, .. } => *user_id,
        }
    }
}

/// Process-owned publish/subscribe channel. Cloning shares the channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(BUS_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: EngineEvent) {
        debug!(topic = event.topic(), receivers = self.tx.receiver_count(), "Publishing engine event");
        // Ignore errors if there are no receivers
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(EngineEvent::MonitorsUpdated { user_id: 9, monitors: Vec::new() });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic(), "monitors_updated");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["topic"], "monitors_updated");
        assert_eq!(json["payload"]["user_id"], 9);
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let event = EngineEvent::SslChecked { user_id: 3, monitor_id: 1, status: MonitorStatus::Down, info: None };
        assert_eq!(event.user_id(), 3);
        EventBus::new(4).publish(event);
    }
}
