// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Decision port — the interface to the external decision policy.
//!
//! The runtime never inspects *how* a decision was produced; it only
//! requires that adapters enforce a per-call timeout, retry transient and
//! invalid responses a bounded number of times, and hand back a decision
//! that passes [`Decision::validate`].
//!
//! Implementations in `infrastructure/decision/`.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::action::{Decision, InvalidDecision};
use crate::domain::page::PageSnapshot;

/// Everything the policy gets to see for one step.
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'a> {
    /// The mission goal the swarm is pursuing.
    pub goal: &'a str,
    /// Mission-level system prompt (already defaulted by the orchestrator).
    pub system_prompt: &'a str,
    /// Fresh snapshot of the page the agent is on.
    pub page: &'a PageSnapshot,
    /// The agent's ordered action-description history.
    pub history: &'a [String],
}

/// Port to the external decision policy (an LLM or any oracle).
#[async_trait]
pub trait DecisionPort: Send + Sync {
    async fn decide(&self, ctx: DecisionContext<'_>) -> Result<Decision, DecisionError>;
}

/// Failure modes of a decision call, after the adapter's own retries.
#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    #[error("decision request timed out after {0:?}")]
    Timeout(Duration),

    #[error("decision transport error: {0}")]
    Transport(String),

    #[error("unparseable decision response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Invalid(#[from] InvalidDecision),

    #[error("no valid decision after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}
