// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Telemetry events flowing over the bus.
//!
//! Events are transient: they exist on the bus and in subscriber memory
//! only. The logger re-derives durable aggregates from them; nothing
//! replays them. The payload is a tagged union so consumers can match
//! exhaustively instead of downcasting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::action::ActionLog;
use crate::domain::agent::{AgentId, AgentStatus};
use crate::domain::mission::MissionId;

/// Event payload, discriminated on the wire as `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    /// An agent changed lifecycle state.
    AgentStatus(AgentEvent),
    /// An agent completed (or failed) one step.
    Action(AgentEvent),
    /// Periodic per-mission aggregate snapshot.
    Summary(SummaryEvent),
    /// Keepalive so idle observers can tell "quiet" from "dead".
    SummaryTick { message: String },
    /// Mission lifecycle markers; the logger keys accumulator lifetime off
    /// these.
    MissionStarted { mission_id: MissionId },
    MissionCompleted { mission_id: MissionId },
}

/// One event on the bus: a timestamp plus the tagged payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    pub fn now(payload: EventPayload) -> Self {
        Self {
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Agent-scoped event payload, optionally carrying the step's action log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub agent_id: AgentId,
    pub mission_id: MissionId,
    pub status: AgentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_log: Option<ActionLog>,
}

/// Periodic mission-level aggregate snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryEvent {
    pub mission_id: MissionId,
    pub total_agents: u32,
    pub active_agents: u32,
    pub completed_agents: u32,
    pub failed_agents: u32,
    pub total_actions: u64,
    pub total_errors: u64,
    pub average_latency_ms: u64,
    pub error_rate_percent: f64,
}
