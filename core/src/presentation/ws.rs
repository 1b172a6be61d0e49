// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Broadcast Hub
//!
//! Fans the event bus out to WebSocket observers. Delivery is best-effort:
//! each connection gets a bounded outbox fed with `try_send`, and a
//! connection that cannot keep up (full outbox, failed write) is dropped
//! and unregistered rather than allowed to apply backpressure to agents.
//!
//! Every 5 seconds the hub emits a `summary_tick` keepalive so an idle
//! observer can tell a quiet swarm from a dead socket.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::events::{Event, EventPayload};
use crate::infrastructure::event_bus::{EventBus, EventBusError};

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);
/// Per-connection outbox depth; beyond this the connection is dropped.
const OUTBOX_CAPACITY: usize = 64;

pub struct EventHub {
    connections: RwLock<HashMap<u64, mpsc::Sender<Message>>>,
    next_id: AtomicU64,
    bus: EventBus,
}

impl EventHub {
    pub fn new(bus: EventBus) -> Arc<Self> {
        Arc::new(Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            bus,
        })
    }

    /// Dispatch loop: forward every bus event to all connections and emit
    /// the periodic keepalive. Runs until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut rx = self.bus.subscribe();
        let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("broadcast hub started");
        loop {
            tokio::select! {
                _ = keepalive.tick() => {
                    self.broadcast(&Event::now(EventPayload::SummaryTick {
                        message: "periodic_tick".to_string(),
                    }));
                }
                event = rx.recv() => match event {
                    Ok(event) => self.broadcast(&event),
                    Err(EventBusError::Lagged(_)) => continue,
                    Err(_) => break,
                },
                _ = cancel.cancelled() => break,
            }
        }
        info!("broadcast hub stopped");
    }

    /// Serialize once, then best-effort deliver to every connection.
    /// Connections whose outbox is full or closed are unregistered.
    pub fn broadcast(&self, event: &Event) {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to serialize event");
                return;
            }
        };
        let message = Message::Text(json.into());

        let mut dead = Vec::new();
        {
            let connections = self.connections.read();
            for (id, tx) in connections.iter() {
                if tx.try_send(message.clone()).is_err() {
                    dead.push(*id);
                }
            }
        }
        if !dead.is_empty() {
            let mut connections = self.connections.write();
            for id in dead {
                connections.remove(&id);
                warn!(connection = id, "dropping slow websocket connection");
                metrics::counter!("stampede_ws_connections_dropped_total").increment(1);
            }
        }
    }

    fn register(&self) -> (u64, mpsc::Receiver<Message>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
        self.connections.write().insert(id, tx);
        debug!(connection = id, "websocket connected");
        metrics::gauge!("stampede_ws_connections").increment(1.0);
        (id, rx)
    }

    fn unregister(&self, id: u64) {
        if self.connections.write().remove(&id).is_some() {
            debug!(connection = id, "websocket disconnected");
            metrics::gauge!("stampede_ws_connections").decrement(1.0);
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }
}

/// Pump one accepted socket: outbox messages go out under a write deadline,
/// and any read error or close frame from the client ends the connection.
pub async fn handle_socket(socket: WebSocket, hub: Arc<EventHub>) {
    let (id, mut outbox) = hub.register();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            outgoing = outbox.recv() => match outgoing {
                Some(message) => {
                    match tokio::time::timeout(WRITE_TIMEOUT, sink.send(message)).await {
                        Ok(Ok(())) => {}
                        _ => break,
                    }
                }
                // Hub dropped us (slow consumer).
                None => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Observers are read-only; ignore anything they send.
                Some(Ok(_)) => {}
            },
        }
    }

    hub.unregister(id);
}
