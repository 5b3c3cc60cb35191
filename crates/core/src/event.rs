//! Domain event system — observability for orchestration runs.
//!
//! The orchestrator and connection pool publish events as a run progresses.
//! Subscribers (the CLI's verbose mode, tests) react without coupling to
//! the loop itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A new round of the loop began
    RoundStarted {
        agent_name: String,
        round: usize,
        timestamp: DateTime<Utc>,
    },

    /// The model answered the "next step" prompt
    ResponseReceived {
        agent_name: String,
        model: String,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// The model selected a worker or tool
    CapabilitySelected {
        agent_name: String,
        capability: String,
        timestamp: DateTime<Utc>,
    },

    /// A tool call was dispatched to its provider
    ToolDispatched {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A failure was recorded in the history and the loop carried on
    RecoverableError {
        agent_name: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// A provider connection failed to start and was left out of the pool
    ConnectionDegraded {
        connection: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A run ended, either with a final answer or by exhausting its rounds
    RunFinished {
        agent_name: String,
        status: String,
        rounds: usize,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
/// Components can subscribe to receive all events and filter for what they care about.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::ToolDispatched {
            tool_name: "add".into(),
            success: true,
            duration_ms: 42,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ToolDispatched { tool_name, success, .. } => {
                assert_eq!(tool_name, "add");
                assert!(success);
            }
            _ => panic!("Expected ToolDispatched event"),
        }
    }

    #[tokio::test]
    async fn cloned_bus_shares_subscribers() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let handle = bus.clone();

        handle.publish(DomainEvent::RunFinished {
            agent_name: "orchestrator".into(),
            status: "finished".into(),
            rounds: 2,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event.as_ref(), DomainEvent::RunFinished { rounds: 2, .. }));
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::RecoverableError {
            agent_name: "orchestrator".into(),
            error_message: "no subscribers".into(),
            timestamp: Utc::now(),
        });
    }
}
