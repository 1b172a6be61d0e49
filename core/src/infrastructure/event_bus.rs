// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
// Event Bus - fan-in from agents, fan-out to observers
//
// In-memory broadcast channel. Delivery is best-effort by design: a
// publisher never blocks, and a subscriber that falls behind the buffer
// loses the oldest events (CapacityDrop). Do not "fix" this into a
// blocking or unbounded queue — a slow observer must never stall agents.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

use crate::domain::events::{Event, EventPayload};

/// Bounded multi-producer broadcast bus for [`Event`]s.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<Event>>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Default capacity (1000) matches one busy mission's burst.
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish a payload stamped with the current time. Never blocks; an
    /// event with no subscribers is simply dropped.
    pub fn publish(&self, payload: EventPayload) {
        self.publish_event(Event::now(payload));
    }

    /// Publish a pre-built event.
    pub fn publish_event(&self, event: Event) {
        metrics::counter!("stampede_events_published_total").increment(1);
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events from this point on.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Receiver side of the bus.
pub struct EventReceiver {
    receiver: broadcast::Receiver<Event>,
}

impl EventReceiver {
    /// Receive the next event, blocking until one is available.
    pub async fn recv(&mut self) -> Result<Event, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                metrics::counter!("stampede_events_dropped_total").increment(n);
                warn!(dropped = n, "event receiver lagged, events dropped");
                EventBusError::Lagged(n)
            }
        })
    }

    /// Receive without blocking.
    pub fn try_recv(&mut self) -> Result<Event, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                metrics::counter!("stampede_events_dropped_total").increment(n);
                warn!(dropped = n, "event receiver lagged, events dropped");
                EventBusError::Lagged(n)
            }
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("event bus is closed")]
    Closed,

    #[error("no events available")]
    Empty,

    #[error("receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mission::MissionId;

    fn tick() -> EventPayload {
        EventPayload::SummaryTick {
            message: "periodic_tick".to_string(),
        }
    }

    #[tokio::test]
    async fn publish_subscribe_delivers_in_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(EventPayload::MissionStarted {
            mission_id: MissionId("mission-1".to_string()),
        });
        bus.publish(tick());

        assert!(matches!(
            rx.recv().await.unwrap().payload,
            EventPayload::MissionStarted { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap().payload,
            EventPayload::SummaryTick { .. }
        ));
    }

    #[tokio::test]
    async fn publish_never_blocks_when_subscriber_stalls() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();

        // Far more events than the buffer holds, without the subscriber
        // draining; publishing must stay instantaneous.
        for _ in 0..100 {
            bus.publish(tick());
        }

        // The stalled subscriber observes a lag, then catches up on the
        // most recent events rather than blocking anyone.
        match rx.recv().await {
            Err(EventBusError::Lagged(n)) => assert!(n >= 90),
            other => panic!("expected lag, got {other:?}"),
        }
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let bus = EventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(tick());
    }
}
