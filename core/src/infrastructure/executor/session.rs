// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Live-session action backend.
//!
//! Adapts any [`BrowserSession`] (a real browser tab behind CDP, WebDriver,
//! or similar) to the [`ActionBackend`] port. Page state lives in the
//! session itself, so execution is a thin capability mapping plus a short
//! settle delay after mutating actions.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::domain::action::{Action, Decision};
use crate::domain::executor::{
    ActionBackend, ActionOutcome, BrowserSession, ExecutorError, PageCapture,
};

/// How long to let the page settle after a click before capturing.
const CLICK_SETTLE: Duration = Duration::from_secs(1);
/// How long a `wait` action pauses the session.
const WAIT_PAUSE: Duration = Duration::from_secs(2);

pub struct SessionBackend<S: BrowserSession> {
    session: S,
}

impl<S: BrowserSession> SessionBackend<S> {
    pub fn new(session: S) -> Self {
        Self { session }
    }

    async fn capture_outcome(&mut self) -> Result<ActionOutcome, ExecutorError> {
        let capture = self.session.capture_dom().await?;
        Ok(ActionOutcome::Navigated {
            html: capture.html,
            url: capture.url,
            status: 200,
        })
    }
}

#[async_trait]
impl<S: BrowserSession> ActionBackend for SessionBackend<S> {
    async fn execute(
        &mut self,
        decision: &Decision,
        current_url: &str,
    ) -> Result<ActionOutcome, ExecutorError> {
        match decision.action {
            Action::Click => {
                let selector = decision.selector.as_deref().unwrap_or_default();
                debug!(selector, "session click");
                self.session.click(selector).await?;
                tokio::time::sleep(CLICK_SETTLE).await;
                self.capture_outcome().await
            }
            Action::Type => {
                let selector = decision.selector.as_deref().unwrap_or_default();
                let text = decision.text_input.as_deref().unwrap_or_default();
                debug!(selector, "session type");
                self.session.type_text(selector, text).await?;
                self.capture_outcome().await
            }
            Action::Visit => {
                self.session.navigate(current_url).await?;
                self.capture_outcome().await
            }
            Action::Wait => {
                tokio::time::sleep(WAIT_PAUSE).await;
                Ok(ActionOutcome::Unchanged)
            }
            Action::GoBack | Action::Completed | Action::Failed => {
                Err(ExecutorError::UnsupportedAction(decision.action.to_string()))
            }
        }
    }

    async fn capture(&mut self, _current_url: &str) -> Result<PageCapture, ExecutorError> {
        self.session.capture_dom().await
    }
}
