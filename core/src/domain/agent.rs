// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent identity and the serializable per-agent snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::mission::MissionId;

/// Unique identifier for an agent within a mission.
///
/// Format: `<mission-id>-agent-<n>` with `n` starting at 1, so an agent id
/// is self-describing in logs and event streams.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    /// Derive the id of the `n`-th agent (1-based) of a mission.
    pub fn for_mission(mission_id: &MissionId, n: u32) -> Self {
        Self(format!("{}-agent-{}", mission_id, n))
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of an agent. All states other than `Initialized` and
/// `Running` are terminal; an agent never re-enters the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Initialized,
    Running,
    Completed,
    Failed,
    Stopped,
    Cancelled,
    RateLimited,
}

impl AgentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AgentStatus::Initialized | AgentStatus::Running)
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentStatus::Initialized => "initialized",
            AgentStatus::Running => "running",
            AgentStatus::Completed => "completed",
            AgentStatus::Failed => "failed",
            AgentStatus::Stopped => "stopped",
            AgentStatus::Cancelled => "cancelled",
            AgentStatus::RateLimited => "rate_limited",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of an agent's state and counters.
///
/// Live counters are owned exclusively by the agent task while it runs;
/// the orchestrator only merges a snapshot into the mission record after
/// the task has fully joined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub mission_id: MissionId,
    pub status: AgentStatus,
    pub current_url: String,
    pub action_history: Vec<String>,
    pub url_history: Vec<String>,
    pub error_count: u32,
    pub success_count: u32,
    pub total_latency_ms: u64,
    pub consecutive_errors: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_action_at: Option<DateTime<Utc>>,
}

impl AgentSnapshot {
    /// Fresh snapshot for an agent that has not taken a step yet.
    pub fn initial(id: AgentId, mission_id: MissionId, start_url: String) -> Self {
        Self {
            id,
            mission_id,
            status: AgentStatus::Initialized,
            current_url: start_url.clone(),
            action_history: Vec::new(),
            url_history: vec![start_url],
            error_count: 0,
            success_count: 0,
            total_latency_ms: 0,
            consecutive_errors: 0,
            last_action_at: None,
        }
    }
}
