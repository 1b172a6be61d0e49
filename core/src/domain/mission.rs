// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Mission Aggregate
//!
//! A [`Mission`] is one configured swarm run against a target URL. The
//! orchestrator owns it for writes while it runs; afterwards it lives in
//! the store for reads.
//!
//! # Invariants
//!
//! - `completed_agents + failed_agents <= num_agents`.
//! - Status only moves forward: `created -> running -> completed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::action::{ActionLog, ActionResult};
use crate::domain::agent::{AgentId, AgentSnapshot, AgentStatus};
use crate::domain::events::SummaryEvent;
use crate::domain::executor::BackendKind;

/// Bounded tail of recent mission-level events kept on the record.
const RECENT_EVENTS_CAP: usize = 10;

/// Unique identifier for a [`Mission`].
///
/// Format: `mission-<uuid8>` — short enough to prefix agent ids with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MissionId(pub String);

impl MissionId {
    /// Generate a new random `MissionId`.
    pub fn generate() -> Self {
        let uuid = Uuid::new_v4().simple().to_string();
        Self(format!("mission-{}", &uuid[..8]))
    }
}

impl std::fmt::Display for MissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Forward-only mission lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    Created,
    Running,
    Completed,
}

/// Request body for creating a mission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMissionRequest {
    pub name: String,
    pub target_url: String,
    pub num_agents: u32,
    pub goal: String,
    pub max_duration_seconds: u64,
    pub rate_limit_per_second: f64,
    #[serde(default)]
    pub initial_system_prompt: String,
    #[serde(default)]
    pub backend: BackendKind,
}

/// Validation failures for [`CreateMissionRequest`].
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum MissionValidationError {
    #[error("name is required")]
    MissingName,
    #[error("target_url is required and must be an absolute URL")]
    InvalidTargetUrl,
    #[error("goal is required")]
    MissingGoal,
    #[error("num_agents must be between 1 and 1000")]
    NumAgentsOutOfRange,
    #[error("max_duration_seconds must be between 10 and 3600")]
    DurationOutOfRange,
    #[error("rate_limit_per_second must be between 0 and 1000")]
    RateLimitOutOfRange,
}

impl CreateMissionRequest {
    pub fn validate(&self) -> Result<(), MissionValidationError> {
        if self.name.trim().is_empty() {
            return Err(MissionValidationError::MissingName);
        }
        if url::Url::parse(&self.target_url).is_err() {
            return Err(MissionValidationError::InvalidTargetUrl);
        }
        if self.goal.trim().is_empty() {
            return Err(MissionValidationError::MissingGoal);
        }
        if self.num_agents < 1 || self.num_agents > 1000 {
            return Err(MissionValidationError::NumAgentsOutOfRange);
        }
        if self.max_duration_seconds < 10 || self.max_duration_seconds > 3600 {
            return Err(MissionValidationError::DurationOutOfRange);
        }
        if self.rate_limit_per_second <= 0.0 || self.rate_limit_per_second > 1000.0 {
            return Err(MissionValidationError::RateLimitOutOfRange);
        }
        Ok(())
    }
}

/// One configured swarm run and its running aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub id: MissionId,
    pub name: String,
    pub target_url: String,
    pub num_agents: u32,
    pub goal: String,
    pub max_duration_seconds: u64,
    pub rate_limit_per_second: f64,
    pub initial_system_prompt: String,
    pub backend: BackendKind,
    pub status: MissionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    // Runtime aggregates, merged in by the orchestrator and logger.
    pub total_actions: u64,
    pub total_errors: u64,
    pub average_latency_ms: u64,
    pub completed_agents: u32,
    pub failed_agents: u32,
    pub recent_events: Vec<ActionLog>,
    pub agent_metrics: HashMap<AgentId, AgentSnapshot>,
}

impl Mission {
    pub fn from_request(req: CreateMissionRequest, default_system_prompt: &str) -> Self {
        let initial_system_prompt = if req.initial_system_prompt.trim().is_empty() {
            default_system_prompt.to_string()
        } else {
            req.initial_system_prompt
        };

        Self {
            id: MissionId::generate(),
            name: req.name,
            target_url: req.target_url,
            num_agents: req.num_agents,
            goal: req.goal,
            max_duration_seconds: req.max_duration_seconds,
            rate_limit_per_second: req.rate_limit_per_second,
            initial_system_prompt,
            backend: req.backend,
            status: MissionStatus::Created,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            total_actions: 0,
            total_errors: 0,
            average_latency_ms: 0,
            completed_agents: 0,
            failed_agents: 0,
            recent_events: Vec::new(),
            agent_metrics: HashMap::new(),
        }
    }

    /// Transition `created -> running`. A mission that is already past
    /// `created` is left untouched.
    pub fn start(&mut self) {
        if self.status == MissionStatus::Created {
            self.status = MissionStatus::Running;
            self.started_at = Some(Utc::now());
        }
    }

    /// Transition to the terminal `completed` state. Never moves backward.
    pub fn complete(&mut self) {
        if self.status != MissionStatus::Completed {
            self.status = MissionStatus::Completed;
            self.completed_at = Some(Utc::now());
        }
    }

    /// Make a spawned agent visible to the status surface before it has
    /// taken a step. Only the snapshot placeholder lands here; the live
    /// counters stay agent-owned until [`Mission::record_agent_exit`]
    /// replaces it on join.
    pub fn register_agent(&mut self, mut snapshot: AgentSnapshot) {
        snapshot.status = AgentStatus::Running;
        self.agent_metrics.insert(snapshot.id.clone(), snapshot);
    }

    /// Merge a joined agent's final snapshot into the mission aggregates.
    ///
    /// Called by the orchestrator only after the agent task has exited, so
    /// there is never a concurrent writer to the live counters.
    pub fn record_agent_exit(&mut self, snapshot: AgentSnapshot) {
        let successes = snapshot.success_count as u64;
        self.total_actions += successes;
        self.total_errors += snapshot.error_count as u64;

        if self.total_actions > 0 {
            let prior = self.total_actions - successes;
            self.average_latency_ms = (self.average_latency_ms * prior
                + snapshot.total_latency_ms)
                / self.total_actions;
        } else {
            self.average_latency_ms = snapshot.total_latency_ms;
        }

        match snapshot.status {
            AgentStatus::Completed if self.terminal_agents() < self.num_agents => {
                self.completed_agents += 1;
            }
            AgentStatus::Failed if self.terminal_agents() < self.num_agents => {
                self.failed_agents += 1;
            }
            _ => {}
        }

        if matches!(snapshot.status, AgentStatus::Completed | AgentStatus::Failed) {
            self.push_recent(ActionLog {
                timestamp: Utc::now(),
                agent_id: snapshot.id.clone(),
                action: "mission_end".to_string(),
                selector: None,
                result: match snapshot.status {
                    AgentStatus::Completed => ActionResult::Success,
                    _ => ActionResult::Failed,
                },
                latency_ms: 0,
                error_message: None,
                new_url: None,
            });
        }

        self.agent_metrics.insert(snapshot.id.clone(), snapshot);
    }

    /// Append to the bounded recent-events tail, evicting the oldest.
    pub fn push_recent(&mut self, log: ActionLog) {
        self.recent_events.push(log);
        if self.recent_events.len() > RECENT_EVENTS_CAP {
            self.recent_events.remove(0);
        }
    }

    fn terminal_agents(&self) -> u32 {
        self.completed_agents + self.failed_agents
    }

    /// Error rate as a percentage of all attempted actions; zero when there
    /// has been no traffic yet.
    pub fn error_rate_percent(&self) -> f64 {
        let total = self.total_actions + self.total_errors;
        if total == 0 {
            return 0.0;
        }
        self.total_errors as f64 / total as f64 * 100.0
    }

    /// Number of agents currently in the `running` state.
    pub fn active_agents(&self) -> u32 {
        self.agent_metrics
            .values()
            .filter(|a| a.status == AgentStatus::Running)
            .count() as u32
    }

    /// Compute the mission-level summary from the current aggregates.
    pub fn summary(&self) -> SummaryEvent {
        SummaryEvent {
            mission_id: self.id.clone(),
            total_agents: self.num_agents,
            active_agents: self.active_agents(),
            completed_agents: self.completed_agents,
            failed_agents: self.failed_agents,
            total_actions: self.total_actions,
            total_errors: self.total_errors,
            average_latency_ms: self.average_latency_ms,
            error_rate_percent: self.error_rate_percent(),
        }
    }
}

/// Response for `GET /api/missions/{id}`: the mission record, per-agent
/// snapshots, and the computed summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionStatusResponse {
    pub mission: Mission,
    pub agent_states: Vec<AgentSnapshot>,
    pub summary: SummaryEvent,
}
