// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Runtime
//!
//! One [`AgentRunner`] is one autonomous agent: a fetch → decide → execute
//! loop that owns its counters exclusively until it exits and hands its
//! final [`AgentSnapshot`] back to the orchestrator.
//!
//! Error handling is deliberately symmetric: every step failure bumps both
//! the lifetime error count and the consecutive-error streak, the streak
//! resets only on a fully successful step, and the agent backs off
//! `streak` seconds between failures so a struggling agent slows down
//! instead of hammering the target.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::action::{Action, ActionLog, ActionResult, Decision};
use crate::domain::agent::{AgentSnapshot, AgentStatus};
use crate::domain::decision::{DecisionContext, DecisionPort};
use crate::domain::executor::{ActionBackend, ActionOutcome};
use crate::domain::events::{AgentEvent, EventPayload};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::html;
use crate::infrastructure::rate_limit::RateLimiter;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Steps after which an agent retires as `completed`.
    pub max_steps: u32,
    /// Consecutive failures after which an agent gives up as `failed`.
    pub max_consecutive_errors: u32,
    /// Upper bound on the per-failure backoff sleep.
    pub error_backoff_cap: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 30,
            max_consecutive_errors: 3,
            error_backoff_cap: Duration::from_secs(10),
        }
    }
}

pub struct AgentRunner {
    snapshot: AgentSnapshot,
    goal: String,
    system_prompt: String,
    decider: Arc<dyn DecisionPort>,
    backend: Box<dyn ActionBackend>,
    limiter: Arc<RateLimiter>,
    bus: EventBus,
    config: AgentConfig,
}

/// What one loop iteration decided about the agent's future.
enum StepVerdict {
    Continue,
    Terminal(AgentStatus),
}

impl AgentRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        snapshot: AgentSnapshot,
        goal: String,
        system_prompt: String,
        decider: Arc<dyn DecisionPort>,
        backend: Box<dyn ActionBackend>,
        limiter: Arc<RateLimiter>,
        bus: EventBus,
        config: AgentConfig,
    ) -> Self {
        Self {
            snapshot,
            goal,
            system_prompt,
            decider,
            backend,
            limiter,
            bus,
            config,
        }
    }

    /// Drive the agent until it reaches a terminal state, then return its
    /// final snapshot for the orchestrator to merge.
    pub async fn run(mut self, cancel: CancellationToken) -> AgentSnapshot {
        self.transition(AgentStatus::Running);
        info!(agent_id = %self.snapshot.id, url = %self.snapshot.current_url, "agent started");

        for step in 0..self.config.max_steps {
            if cancel.is_cancelled() {
                self.transition(AgentStatus::Cancelled);
                return self.snapshot;
            }
            if self.snapshot.consecutive_errors >= self.config.max_consecutive_errors {
                warn!(
                    agent_id = %self.snapshot.id,
                    streak = self.snapshot.consecutive_errors,
                    "too many consecutive errors, giving up"
                );
                self.transition(AgentStatus::Failed);
                return self.snapshot;
            }

            // Cancelled while queued for a token: the agent was throttled
            // out, not stopped between steps.
            if self.limiter.wait(&cancel).await.is_err() {
                self.transition(AgentStatus::RateLimited);
                return self.snapshot;
            }

            debug!(agent_id = %self.snapshot.id, step, "taking step");
            match self.step(&cancel).await {
                StepVerdict::Continue => {}
                StepVerdict::Terminal(status) => {
                    self.transition(status);
                    return self.snapshot;
                }
            }
        }

        // Step budget exhausted: the agent retires gracefully.
        info!(agent_id = %self.snapshot.id, "max steps reached");
        self.transition(AgentStatus::Completed);
        self.snapshot
    }

    async fn step(&mut self, cancel: &CancellationToken) -> StepVerdict {
        let started = Instant::now();

        let capture = match self.backend.capture(&self.snapshot.current_url).await {
            Ok(capture) => capture,
            Err(e) => {
                return self
                    .fail_step("fetch", None, started, e.to_string(), cancel)
                    .await;
            }
        };
        let page = html::parse_page(&capture.url, &capture.html);

        let ctx = DecisionContext {
            goal: &self.goal,
            system_prompt: &self.system_prompt,
            page: &page,
            history: &self.snapshot.action_history,
        };
        let decision = match self.decider.decide(ctx).await {
            Ok(decision) => decision,
            Err(e) => {
                return self
                    .fail_step("decide", None, started, e.to_string(), cancel)
                    .await;
            }
        };

        if decision.action.is_terminal() {
            info!(
                agent_id = %self.snapshot.id,
                action = %decision.action,
                reasoning = %decision.reasoning,
                "agent reached a terminal decision"
            );
            self.succeed_step(&decision, started, None);
            let status = match decision.action {
                Action::Completed => AgentStatus::Completed,
                _ => AgentStatus::Failed,
            };
            return StepVerdict::Terminal(status);
        }

        if decision.action == Action::GoBack {
            if self.snapshot.url_history.len() > 1 {
                self.snapshot.url_history.pop();
                if let Some(previous) = self.snapshot.url_history.last() {
                    self.snapshot.current_url = previous.clone();
                }
            } else {
                warn!(agent_id = %self.snapshot.id, "go_back at origin, staying put");
            }
            let url = self.snapshot.current_url.clone();
            self.succeed_step(&decision, started, Some(url));
            return StepVerdict::Continue;
        }

        match self.backend.execute(&decision, &self.snapshot.current_url).await {
            Ok(ActionOutcome::Navigated { url, status, .. }) => {
                debug!(agent_id = %self.snapshot.id, url = %url, status, "navigated");
                if url != self.snapshot.current_url {
                    self.snapshot.url_history.push(url.clone());
                    self.snapshot.current_url = url.clone();
                }
                self.succeed_step(&decision, started, Some(url));
                StepVerdict::Continue
            }
            Ok(ActionOutcome::Unchanged) => {
                self.succeed_step(&decision, started, None);
                StepVerdict::Continue
            }
            Err(e) => {
                self.fail_step(
                    decision.action.as_str(),
                    decision.selector.clone(),
                    started,
                    e.to_string(),
                    cancel,
                )
                .await
            }
        }
    }

    /// Record a successful step and publish its action event.
    fn succeed_step(&mut self, decision: &Decision, started: Instant, new_url: Option<String>) {
        let latency_ms = started.elapsed().as_millis() as u64;
        self.snapshot.success_count += 1;
        self.snapshot.consecutive_errors = 0;
        self.snapshot.total_latency_ms += latency_ms;
        self.snapshot.last_action_at = Some(chrono::Utc::now());
        self.snapshot.action_history.push(decision.describe());
        metrics::counter!("stampede_actions_total", "result" => "success").increment(1);

        self.publish_action(ActionLog {
            timestamp: chrono::Utc::now(),
            agent_id: self.snapshot.id.clone(),
            action: decision.action.to_string(),
            selector: decision.selector.clone(),
            result: ActionResult::Success,
            latency_ms,
            error_message: None,
            new_url,
        });
    }

    /// Record a failed step, publish it, and back off `streak` seconds
    /// (capped) so a struggling agent decelerates. Cancellation cuts the
    /// backoff short and terminates the agent.
    async fn fail_step(
        &mut self,
        action: &str,
        selector: Option<String>,
        started: Instant,
        error: String,
        cancel: &CancellationToken,
    ) -> StepVerdict {
        let latency_ms = started.elapsed().as_millis() as u64;
        self.snapshot.error_count += 1;
        self.snapshot.consecutive_errors += 1;
        self.snapshot.last_action_at = Some(chrono::Utc::now());
        metrics::counter!("stampede_actions_total", "result" => "failed").increment(1);

        warn!(
            agent_id = %self.snapshot.id,
            action,
            streak = self.snapshot.consecutive_errors,
            error = %error,
            "step failed"
        );
        self.publish_action(ActionLog {
            timestamp: chrono::Utc::now(),
            agent_id: self.snapshot.id.clone(),
            action: action.to_string(),
            selector,
            result: ActionResult::Failed,
            latency_ms,
            error_message: Some(error),
            new_url: None,
        });

        let backoff = Duration::from_secs(self.snapshot.consecutive_errors as u64)
            .min(self.config.error_backoff_cap);
        tokio::select! {
            _ = tokio::time::sleep(backoff) => StepVerdict::Continue,
            _ = cancel.cancelled() => StepVerdict::Terminal(AgentStatus::Cancelled),
        }
    }

    fn transition(&mut self, status: AgentStatus) {
        self.snapshot.status = status;
        self.bus.publish(EventPayload::AgentStatus(AgentEvent {
            agent_id: self.snapshot.id.clone(),
            mission_id: self.snapshot.mission_id.clone(),
            status,
            action_log: None,
        }));
    }

    fn publish_action(&self, log: ActionLog) {
        self.bus.publish(EventPayload::Action(AgentEvent {
            agent_id: self.snapshot.id.clone(),
            mission_id: self.snapshot.mission_id.clone(),
            status: self.snapshot.status,
            action_log: Some(log),
        }));
    }
}
