// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Actions, decisions, and the append-only action log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::agent::AgentId;

/// The actions a decision policy may choose from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Click an interactive element (link, button).
    Click,
    /// Fill an input field and submit its enclosing form.
    Type,
    /// Observe without side effects; the agent re-fetches the page.
    Wait,
    /// Pop the URL history (handled by the agent, not the executor).
    GoBack,
    /// Re-navigate to the current URL.
    Visit,
    /// Terminal: the policy considers the goal achieved.
    Completed,
    /// Terminal: the policy considers the goal unreachable.
    Failed,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Click => "click",
            Action::Type => "type",
            Action::Wait => "wait",
            Action::GoBack => "go_back",
            Action::Visit => "visit",
            Action::Completed => "completed",
            Action::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Action::Completed | Action::Failed)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = InvalidDecision;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "click" => Ok(Action::Click),
            "type" => Ok(Action::Type),
            "wait" => Ok(Action::Wait),
            "go_back" => Ok(Action::GoBack),
            "visit" => Ok(Action::Visit),
            "completed" => Ok(Action::Completed),
            "failed" => Ok(Action::Failed),
            other => Err(InvalidDecision::UnknownAction(other.to_string())),
        }
    }
}

/// Semantic validation failures for a decision that parsed structurally.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum InvalidDecision {
    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("selector required for action: {0}")]
    MissingSelector(Action),

    #[error("text_input required for type action")]
    MissingTextInput,
}

/// A validated decision returned by the policy for one agent step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub reasoning: String,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_next_state: Option<String>,
}

impl Decision {
    /// Enforce the per-action field requirements: `click`/`type` need a
    /// selector, `type` additionally needs `text_input`.
    pub fn validate(&self) -> Result<(), InvalidDecision> {
        match self.action {
            Action::Click | Action::Type => {
                if self.selector.as_deref().unwrap_or("").is_empty() {
                    return Err(InvalidDecision::MissingSelector(self.action));
                }
                if self.action == Action::Type
                    && self.text_input.as_deref().unwrap_or("").is_empty()
                {
                    return Err(InvalidDecision::MissingTextInput);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Human-readable one-liner for the agent's action history.
    pub fn describe(&self) -> String {
        match (self.action, &self.selector, &self.text_input) {
            (Action::Type, Some(sel), Some(text)) => {
                format!("type '{}' into {}", text, sel)
            }
            (_, Some(sel), _) => format!("{} {}", self.action, sel),
            _ => self.action.to_string(),
        }
    }
}

/// Outcome tag of a single agent step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionResult {
    Success,
    Failed,
}

/// One immutable record of a single agent step's outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    pub timestamp: DateTime<Utc>,
    pub agent_id: AgentId,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    pub result: ActionResult,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_url: Option<String>,
}
