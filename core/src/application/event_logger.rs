// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Event Logger / Metrics Aggregator
//!
//! Second subscriber on the event bus (the broadcast hub being the first).
//! Keeps one in-memory accumulator per running mission and flushes it into
//! the mission record on a fixed interval and on mission lifecycle events.
//!
//! Counter ownership: step counters are merged into the mission record
//! exactly once, by the orchestrator, after the agent task joins. The
//! flush therefore only blends the latency estimate and logs the interval
//! aggregates; it never re-adds action counts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::domain::action::ActionResult;
use crate::domain::events::{Event, EventPayload};
use crate::domain::mission::MissionId;
use crate::domain::store::MissionStore;
use crate::infrastructure::event_bus::{EventBus, EventBusError};

const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct Accumulator {
    actions: u64,
    errors: u64,
    latency_sum_ms: u64,
    latency_count: u64,
}

pub struct EventLogger {
    store: Arc<dyn MissionStore>,
    bus: EventBus,
    flush_interval: Duration,
}

impl EventLogger {
    pub fn new(store: Arc<dyn MissionStore>, bus: EventBus) -> Self {
        Self {
            store,
            bus,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }

    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    /// Consume the bus until cancelled, flushing accumulated aggregates on
    /// every tick and on mission completion. Performs one last flush of
    /// everything still accumulated before returning.
    pub async fn run(self, cancel: CancellationToken) {
        let mut rx = self.bus.subscribe();
        let mut accumulators: HashMap<MissionId, Accumulator> = HashMap::new();
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("event logger started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for (mission_id, acc) in accumulators.iter_mut() {
                        self.flush(mission_id, acc);
                    }
                }
                event = rx.recv() => match event {
                    Ok(event) => self.observe(event, &mut accumulators),
                    // Lag just means we missed telemetry; keep consuming.
                    Err(EventBusError::Lagged(_)) => continue,
                    Err(_) => break,
                },
                _ = cancel.cancelled() => break,
            }
        }

        for (mission_id, acc) in accumulators.iter_mut() {
            self.flush(mission_id, acc);
        }
        info!("event logger stopped");
    }

    fn observe(&self, event: Event, accumulators: &mut HashMap<MissionId, Accumulator>) {
        match event.payload {
            EventPayload::MissionStarted { mission_id } => {
                debug!(%mission_id, "tracking mission aggregates");
                accumulators.entry(mission_id).or_default();
            }
            EventPayload::MissionCompleted { mission_id } => {
                if let Some(mut acc) = accumulators.remove(&mission_id) {
                    self.flush(&mission_id, &mut acc);
                }
            }
            EventPayload::Action(agent_event) => {
                if let Some(log) = agent_event.action_log {
                    let acc = accumulators
                        .entry(agent_event.mission_id.clone())
                        .or_default();
                    match log.result {
                        ActionResult::Success => {
                            acc.actions += 1;
                            acc.latency_sum_ms += log.latency_ms;
                            acc.latency_count += 1;
                        }
                        ActionResult::Failed => acc.errors += 1,
                    }
                    self.store.add_action_log(log, &agent_event.mission_id);
                }
            }
            _ => {}
        }
    }

    /// Merge one interval's aggregates into the mission record: the stored
    /// mean latency is blended two-point with the interval mean — a cheap
    /// approximation, not an exact aggregate — and the accumulator resets.
    fn flush(&self, mission_id: &MissionId, acc: &mut Accumulator) {
        if acc.actions == 0 && acc.errors == 0 {
            return;
        }

        let interval_avg_ms = if acc.latency_count > 0 {
            acc.latency_sum_ms / acc.latency_count
        } else {
            0
        };
        debug!(
            %mission_id,
            actions = acc.actions,
            errors = acc.errors,
            interval_avg_ms,
            "flushing interval aggregates"
        );
        metrics::counter!("stampede_logger_flushes_total").increment(1);

        if interval_avg_ms > 0 {
            self.store.update(
                mission_id,
                Box::new(move |mission| {
                    mission.average_latency_ms = if mission.average_latency_ms == 0 {
                        interval_avg_ms
                    } else {
                        (mission.average_latency_ms + interval_avg_ms) / 2
                    };
                }),
            );
        }

        *acc = Accumulator::default();
    }
}
