// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Action-execution ports.
//!
//! Two capability-equivalent backends exist: the stateless HTTP backend
//! (fetch + parse + form submission) and a stateful live-session backend
//! driving a real browser through the narrow [`BrowserSession`] port. The
//! agent loop only ever talks to [`ActionBackend`]; which one it gets is a
//! per-mission configuration choice, not a type switch in the loop.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::action::Decision;

/// Which executor implementation a mission's agents use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Http,
    Browser,
}

/// Result of executing one action.
#[derive(Debug, Clone)]
pub enum ActionOutcome {
    /// The action produced a page: the (possibly redirected) URL, its body,
    /// and the final status code.
    Navigated {
        html: String,
        url: String,
        status: u16,
    },
    /// No I/O happened (e.g. `wait`); the agent should re-fetch on its next
    /// step rather than advance.
    Unchanged,
}

/// The raw DOM + URL pair a backend can capture at any time.
#[derive(Debug, Clone)]
pub struct PageCapture {
    pub html: String,
    pub url: String,
}

/// Executes decided actions against the target site.
///
/// A backend instance is owned by exactly one agent, so stateful
/// implementations (cookie jars, live browser tabs) need no internal
/// locking.
#[async_trait]
pub trait ActionBackend: Send {
    /// Perform `decision` from `current_url` and report the resulting page.
    async fn execute(
        &mut self,
        decision: &Decision,
        current_url: &str,
    ) -> Result<ActionOutcome, ExecutorError>;

    /// Capture the current page state without performing an action.
    async fn capture(&mut self, current_url: &str) -> Result<PageCapture, ExecutorError>;
}

/// Creates one backend per agent at spawn time.
pub trait BackendFactory: Send + Sync {
    fn create(&self, kind: BackendKind) -> anyhow::Result<Box<dyn ActionBackend>>;
}

/// Capability contract for a headless-browser session. The automation
/// protocol behind it (CDP, WebDriver, ...) is an external collaborator.
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), ExecutorError>;
    async fn click(&mut self, selector: &str) -> Result<(), ExecutorError>;
    async fn type_text(&mut self, selector: &str, text: &str) -> Result<(), ExecutorError>;
    async fn capture_dom(&mut self) -> Result<PageCapture, ExecutorError>;
}

/// Failure modes of action execution. These are fatal to the step, not
/// necessarily to the agent — the agent's backoff loop decides.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("server returned {0}")]
    Status(u16),

    #[error("invalid selector '{0}'")]
    InvalidSelector(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("element not clickable: {0}")]
    ElementNotClickable(String),

    #[error("no form found for input: {0}")]
    FormNotFound(String),

    #[error("invalid URL: {0}")]
    Url(String),

    #[error("action not supported by this backend: {0}")]
    UnsupportedAction(String),
}
