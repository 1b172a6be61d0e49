// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Mission Orchestrator
//!
//! Validates mission requests, spawns one task per agent, and supervises
//! the run: a single cancellation scope per mission (deadline =
//! `max_duration_seconds` from start), a 5s summary ticker while the
//! mission runs, and a merge of every agent's final snapshot after its
//! task joins. Counters are only ever written here post-join, so there is
//! no lock-per-increment anywhere in the hot path.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::application::agent_runner::{AgentConfig, AgentRunner};
use crate::domain::agent::{AgentId, AgentSnapshot, AgentStatus};
use crate::domain::decision::DecisionPort;
use crate::domain::events::EventPayload;
use crate::domain::executor::BackendFactory;
use crate::domain::mission::{
    CreateMissionRequest, Mission, MissionId, MissionStatusResponse, MissionValidationError,
};
use crate::domain::store::MissionStore;
use crate::infrastructure::decision::prompt::DEFAULT_SYSTEM_PROMPT;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::rate_limit::RateLimiterRegistry;

const SUMMARY_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Validation(#[from] MissionValidationError),

    #[error("mission not found: {0}")]
    NotFound(MissionId),
}

pub struct MissionOrchestrator {
    store: Arc<dyn MissionStore>,
    decider: Arc<dyn DecisionPort>,
    backends: Arc<dyn BackendFactory>,
    limiters: Arc<RateLimiterRegistry>,
    bus: EventBus,
    agent_config: AgentConfig,
}

impl MissionOrchestrator {
    pub fn new(
        store: Arc<dyn MissionStore>,
        decider: Arc<dyn DecisionPort>,
        backends: Arc<dyn BackendFactory>,
        limiters: Arc<RateLimiterRegistry>,
        bus: EventBus,
    ) -> Self {
        Self {
            store,
            decider,
            backends,
            limiters,
            bus,
            agent_config: AgentConfig::default(),
        }
    }

    pub fn with_agent_config(mut self, agent_config: AgentConfig) -> Self {
        self.agent_config = agent_config;
        self
    }

    /// Validate, persist, and launch a mission. Returns the created record
    /// immediately; the swarm runs in the background.
    pub fn create_mission(
        self: &Arc<Self>,
        request: CreateMissionRequest,
    ) -> Result<Mission, OrchestratorError> {
        request.validate()?;

        let mission = Mission::from_request(request, DEFAULT_SYSTEM_PROMPT);
        self.store.put(mission.clone());
        info!(
            mission_id = %mission.id,
            name = %mission.name,
            agents = mission.num_agents,
            target = %mission.target_url,
            "mission created"
        );
        metrics::counter!("stampede_missions_created_total").increment(1);

        let orchestrator = Arc::clone(self);
        let launched = mission.clone();
        tokio::spawn(async move { orchestrator.run_mission(launched).await });
        Ok(mission)
    }

    pub fn mission_status(&self, id: &MissionId) -> Result<MissionStatusResponse, OrchestratorError> {
        let mission = self
            .store
            .get(id)
            .ok_or_else(|| OrchestratorError::NotFound(id.clone()))?;
        let mut agent_states: Vec<AgentSnapshot> =
            mission.agent_metrics.values().cloned().collect();
        agent_states.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        let summary = mission.summary();
        Ok(MissionStatusResponse {
            mission,
            agent_states,
            summary,
        })
    }

    pub fn list_missions(&self) -> Vec<Mission> {
        let mut missions = self.store.list();
        missions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        missions
    }

    async fn run_mission(self: Arc<Self>, mission: Mission) {
        let mission_id = mission.id.clone();
        self.store
            .update(&mission_id, Box::new(|m| m.start()));
        self.bus.publish(EventPayload::MissionStarted {
            mission_id: mission_id.clone(),
        });

        let limiter = self
            .limiters
            .get_or_create(&mission_id, mission.rate_limit_per_second);

        // One cancellation scope for the whole swarm, cut at the deadline.
        let cancel = CancellationToken::new();
        let deadline_task = tokio::spawn({
            let token = cancel.clone();
            let id = mission_id.clone();
            let deadline = Duration::from_secs(mission.max_duration_seconds);
            async move {
                tokio::time::sleep(deadline).await;
                warn!(mission_id = %id, "mission deadline reached, cancelling agents");
                token.cancel();
            }
        });
        let summary_stop = CancellationToken::new();
        let summary_task = tokio::spawn(summary_ticker(
            self.store.clone(),
            self.bus.clone(),
            mission_id.clone(),
            summary_stop.clone(),
        ));

        let mut agents = JoinSet::new();
        for n in 1..=mission.num_agents {
            let agent_id = AgentId::for_mission(&mission_id, n);
            let snapshot = AgentSnapshot::initial(
                agent_id.clone(),
                mission_id.clone(),
                mission.target_url.clone(),
            );
            // Visible in status responses from spawn, not first join.
            let registered = snapshot.clone();
            self.store.update(
                &mission_id,
                Box::new(move |m| m.register_agent(registered)),
            );

            let backend = match self.backends.create(mission.backend) {
                Ok(backend) => backend,
                Err(e) => {
                    error!(%agent_id, error = %e, "failed to create agent backend");
                    let mut failed = snapshot;
                    failed.status = AgentStatus::Failed;
                    failed.error_count = 1;
                    self.store.update(
                        &mission_id,
                        Box::new(move |m| m.record_agent_exit(failed)),
                    );
                    continue;
                }
            };

            let runner = AgentRunner::new(
                snapshot,
                mission.goal.clone(),
                mission.initial_system_prompt.clone(),
                self.decider.clone(),
                backend,
                limiter.clone(),
                self.bus.clone(),
                self.agent_config.clone(),
            );
            agents.spawn(runner.run(cancel.clone()));
        }

        while let Some(joined) = agents.join_next().await {
            match joined {
                Ok(snapshot) => {
                    info!(
                        mission_id = %mission_id,
                        agent_id = %snapshot.id,
                        status = %snapshot.status,
                        actions = snapshot.success_count,
                        errors = snapshot.error_count,
                        "agent finished"
                    );
                    self.store.update(
                        &mission_id,
                        Box::new(move |m| m.record_agent_exit(snapshot)),
                    );
                }
                Err(e) => error!(mission_id = %mission_id, error = %e, "agent task panicked"),
            }
        }

        cancel.cancel();
        deadline_task.abort();
        summary_stop.cancel();
        let _ = summary_task.await;

        self.store.update(&mission_id, Box::new(|m| m.complete()));
        if let Some(completed) = self.store.get(&mission_id) {
            // Final summary so observers see the settled aggregates.
            self.bus.publish(EventPayload::Summary(completed.summary()));
            info!(
                mission_id = %mission_id,
                completed_agents = completed.completed_agents,
                failed_agents = completed.failed_agents,
                total_actions = completed.total_actions,
                "mission completed"
            );
        }
        self.bus.publish(EventPayload::MissionCompleted {
            mission_id: mission_id.clone(),
        });
        self.limiters.remove(&mission_id);
        metrics::counter!("stampede_missions_completed_total").increment(1);
    }
}

/// Publishes the mission's aggregate summary every [`SUMMARY_INTERVAL`]
/// while the mission runs.
async fn summary_ticker(
    store: Arc<dyn MissionStore>,
    bus: EventBus,
    mission_id: MissionId,
    stop: CancellationToken,
) {
    let mut ticker = tokio::time::interval(SUMMARY_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(mission) = store.get(&mission_id) {
                    bus.publish(EventPayload::Summary(mission.summary()));
                }
            }
            _ = stop.cancelled() => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action::{Action, Decision};
    use crate::domain::decision::{DecisionContext, DecisionError};
    use crate::domain::executor::{
        ActionBackend, ActionOutcome, BackendKind, ExecutorError, PageCapture,
    };
    use crate::domain::mission::MissionStatus;
    use crate::infrastructure::memory_store::InMemoryMissionStore;
    use async_trait::async_trait;

    const PAGE: &str = "<html><head><title>t</title></head><body>hi</body></html>";

    /// Returns the same decision forever.
    struct ConstantDecider(Decision);

    #[async_trait]
    impl DecisionPort for ConstantDecider {
        async fn decide(&self, _ctx: DecisionContext<'_>) -> Result<Decision, DecisionError> {
            Ok(self.0.clone())
        }
    }

    struct StubBackend;

    #[async_trait]
    impl ActionBackend for StubBackend {
        async fn execute(
            &mut self,
            _decision: &Decision,
            current_url: &str,
        ) -> Result<ActionOutcome, ExecutorError> {
            Ok(ActionOutcome::Navigated {
                html: PAGE.to_string(),
                url: current_url.to_string(),
                status: 200,
            })
        }

        async fn capture(&mut self, current_url: &str) -> Result<PageCapture, ExecutorError> {
            Ok(PageCapture {
                html: PAGE.to_string(),
                url: current_url.to_string(),
            })
        }
    }

    struct StubFactory;

    impl BackendFactory for StubFactory {
        fn create(&self, _kind: BackendKind) -> anyhow::Result<Box<dyn ActionBackend>> {
            Ok(Box::new(StubBackend))
        }
    }

    fn decision(action: Action) -> Decision {
        Decision {
            reasoning: "stub".to_string(),
            action,
            selector: None,
            text_input: None,
            expected_next_state: None,
        }
    }

    fn request(num_agents: u32) -> CreateMissionRequest {
        CreateMissionRequest {
            name: "swarm".to_string(),
            target_url: "https://example.com/".to_string(),
            num_agents,
            goal: "explore".to_string(),
            max_duration_seconds: 60,
            rate_limit_per_second: 100.0,
            initial_system_prompt: String::new(),
            backend: BackendKind::Http,
        }
    }

    fn orchestrator(
        store: Arc<InMemoryMissionStore>,
        decider: Arc<dyn DecisionPort>,
        limiters: Arc<RateLimiterRegistry>,
        bus: EventBus,
    ) -> Arc<MissionOrchestrator> {
        Arc::new(MissionOrchestrator::new(
            store,
            decider,
            Arc::new(StubFactory),
            limiters,
            bus,
        ))
    }

    async fn wait_until_completed(store: &InMemoryMissionStore, id: &MissionId) -> Mission {
        for _ in 0..200 {
            if let Some(m) = store.get(id) {
                if m.status == MissionStatus::Completed {
                    return m;
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("mission {id} never completed");
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected_before_anything_runs() {
        let store = Arc::new(InMemoryMissionStore::new());
        let orchestrator = orchestrator(
            store.clone(),
            Arc::new(ConstantDecider(decision(Action::Completed))),
            Arc::new(RateLimiterRegistry::new()),
            EventBus::new(16),
        );

        let mut bad = request(1);
        bad.num_agents = 0;
        let err = orchestrator.create_mission(bad).unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation(_)));
        assert!(store.list().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn mission_runs_to_completion_and_merges_agents() {
        let store = Arc::new(InMemoryMissionStore::new());
        let limiters = Arc::new(RateLimiterRegistry::new());
        let bus = EventBus::new(256);
        let mut rx = bus.subscribe();
        let orchestrator = orchestrator(
            store.clone(),
            Arc::new(ConstantDecider(decision(Action::Completed))),
            limiters.clone(),
            bus,
        );

        let mission = orchestrator.create_mission(request(3)).unwrap();
        let done = wait_until_completed(&store, &mission.id).await;

        assert_eq!(done.completed_agents, 3);
        assert_eq!(done.failed_agents, 0);
        assert_eq!(done.agent_metrics.len(), 3);
        assert!(limiters.is_empty());

        let mut saw_started = false;
        let mut saw_completed = false;
        while let Ok(event) = rx.try_recv() {
            match event.payload {
                EventPayload::MissionStarted { .. } => saw_started = true,
                EventPayload::MissionCompleted { .. } => saw_completed = true,
                _ => {}
            }
        }
        assert!(saw_started);
        assert!(saw_completed);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_agents_that_never_finish() {
        let store = Arc::new(InMemoryMissionStore::new());
        let orchestrator = orchestrator(
            store.clone(),
            // `wait` forever: only the deadline can end this mission.
            Arc::new(ConstantDecider(decision(Action::Wait))),
            Arc::new(RateLimiterRegistry::new()),
            EventBus::new(256),
        );

        let mut req = request(2);
        req.max_duration_seconds = 10;
        req.rate_limit_per_second = 0.1;
        let mission = orchestrator.create_mission(req).unwrap();
        let done = wait_until_completed(&store, &mission.id).await;

        assert_eq!(done.completed_agents, 0);
        assert_eq!(done.failed_agents, 0);
        // The deadline catches agents either between steps (cancelled) or
        // blocked inside the limiter (rate_limited).
        assert!(done.agent_metrics.values().all(|a| matches!(
            a.status,
            AgentStatus::Cancelled | AgentStatus::RateLimited
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn live_agents_are_visible_in_status_mid_run() {
        let store = Arc::new(InMemoryMissionStore::new());
        let orchestrator = orchestrator(
            store.clone(),
            Arc::new(ConstantDecider(decision(Action::Wait))),
            Arc::new(RateLimiterRegistry::new()),
            EventBus::new(256),
        );

        // A near-empty limiter keeps the swarm running well past the
        // point where status is queried.
        let mut req = request(3);
        req.max_duration_seconds = 10;
        req.rate_limit_per_second = 0.1;
        let mission = orchestrator.create_mission(req).unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        let status = orchestrator.mission_status(&mission.id).unwrap();
        assert_eq!(status.agent_states.len(), 3);
        assert_eq!(status.summary.active_agents, 3);
        assert!(status
            .agent_states
            .iter()
            .all(|a| a.status == AgentStatus::Running));

        wait_until_completed(&store, &mission.id).await;
    }

    #[tokio::test]
    async fn status_of_unknown_mission_is_not_found() {
        let store = Arc::new(InMemoryMissionStore::new());
        let orchestrator = orchestrator(
            store,
            Arc::new(ConstantDecider(decision(Action::Completed))),
            Arc::new(RateLimiterRegistry::new()),
            EventBus::new(16),
        );

        let err = orchestrator
            .mission_status(&MissionId::generate())
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound(_)));
    }
}
