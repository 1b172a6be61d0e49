// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Gemini decision adapter.
//!
//! Calls the Gemini `generateContent` REST endpoint, enforces a per-call
//! timeout, and retries transport failures and invalid responses up to a
//! bounded attempt count. Models love wrapping JSON in markdown fences,
//! so the raw text is unfenced before parsing.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

use async_trait::async_trait;

use crate::domain::action::{Action, Decision};
use crate::domain::decision::{DecisionContext, DecisionError, DecisionPort};
use crate::infrastructure::decision::prompt;

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_ATTEMPTS: u32 = 3;
const TEMPERATURE: f64 = 0.7;
const MAX_OUTPUT_TOKENS: u32 = 1024;

pub struct GeminiDecider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl GeminiDecider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Point the adapter at a different API base (tests, proxies).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn request_once(
        &self,
        system: &str,
        user: &str,
    ) -> Result<String, DecisionError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        );
        let body = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part { text: system }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: user }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };

        let send = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send();
        let resp = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| DecisionError::Timeout(self.timeout))?
            .map_err(|e| DecisionError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| DecisionError::Transport(e.to_string()))?;
        if status != StatusCode::OK {
            return Err(DecisionError::Transport(format!("HTTP {status}: {text}")));
        }

        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| DecisionError::Malformed(format!("response envelope: {e}")))?;
        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| DecisionError::Malformed("no candidates in response".to_string()))
    }
}

#[async_trait]
impl DecisionPort for GeminiDecider {
    async fn decide(&self, ctx: DecisionContext<'_>) -> Result<Decision, DecisionError> {
        let system = prompt::build_system_prompt(ctx.system_prompt);
        let user = prompt::build_user_prompt(&ctx);

        let mut last = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            match self.request_once(&system, &user).await {
                Ok(text) => match parse_decision(&text) {
                    Ok(decision) => {
                        debug!(action = %decision.action, attempt, "decision accepted");
                        return Ok(decision);
                    }
                    Err(e) => {
                        warn!(attempt, error = %e, "invalid decision, retrying");
                        last = e.to_string();
                    }
                },
                Err(e) => {
                    warn!(attempt, error = %e, "decision request failed, retrying");
                    last = e.to_string();
                }
            }
        }
        Err(DecisionError::Exhausted {
            attempts: MAX_ATTEMPTS,
            last,
        })
    }
}

/// Parse model output into a validated [`Decision`].
fn parse_decision(text: &str) -> Result<Decision, DecisionError> {
    let cleaned = strip_fences(text);
    let raw: RawDecision = serde_json::from_str(cleaned)
        .map_err(|e| DecisionError::Malformed(format!("{e}: {cleaned}")))?;

    let decision = Decision {
        reasoning: raw.reasoning,
        action: Action::from_str(&raw.action)?,
        selector: raw.selector.filter(|s| !s.is_empty()),
        text_input: raw.text_input.filter(|s| !s.is_empty()),
        expected_next_state: raw.expected_next_state.filter(|s| !s.is_empty()),
    };
    decision.validate()?;
    Ok(decision)
}

fn strip_fences(text: &str) -> &str {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Deserialize)]
struct TextPart {
    #[serde(default)]
    text: String,
}

/// Loose, pre-validation shape of the model's JSON.
#[derive(Deserialize)]
struct RawDecision {
    #[serde(default)]
    reasoning: String,
    action: String,
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    text_input: Option<String>,
    #[serde(default)]
    expected_next_state: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::page::PageSnapshot;
    use chrono::Utc;

    fn candidate_body(text: &str) -> String {
        serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": text }] }
            }]
        })
        .to_string()
    }

    fn page() -> PageSnapshot {
        PageSnapshot {
            url: "https://example.com/".to_string(),
            title: "Example".to_string(),
            description: String::new(),
            text_content: String::new(),
            interactive_elements: vec![],
            timestamp: Utc::now(),
        }
    }

    fn ctx(page: &PageSnapshot) -> DecisionContext<'_> {
        DecisionContext {
            goal: "explore",
            system_prompt: "",
            page,
            history: &[],
        }
    }

    #[tokio::test]
    async fn valid_decision_is_returned_first_try() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/gemini-2.0-flash:generateContent")
            .match_header("x-goog-api-key", "test-key")
            .with_body(candidate_body(
                r#"{"reasoning":"go","action":"click","selector":"a.nav"}"#,
            ))
            .create_async()
            .await;

        let decider =
            GeminiDecider::new("test-key", "gemini-2.0-flash").with_endpoint(server.url());
        let page = page();
        let decision = decider.decide(ctx(&page)).await.unwrap();

        mock.assert_async().await;
        assert_eq!(decision.action, Action::Click);
        assert_eq!(decision.selector.as_deref(), Some("a.nav"));
    }

    #[tokio::test]
    async fn markdown_fences_are_stripped() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/m:generateContent")
            .with_body(candidate_body(
                "```json\n{\"reasoning\":\"done\",\"action\":\"completed\"}\n```",
            ))
            .create_async()
            .await;

        let decider = GeminiDecider::new("k", "m").with_endpoint(server.url());
        let page = page();
        let decision = decider.decide(ctx(&page)).await.unwrap();
        assert_eq!(decision.action, Action::Completed);
    }

    #[tokio::test]
    async fn invalid_decisions_exhaust_retries() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/m:generateContent")
            .with_body(candidate_body(r#"{"reasoning":"?","action":"scroll"}"#))
            .expect(3)
            .create_async()
            .await;

        let decider = GeminiDecider::new("k", "m").with_endpoint(server.url());
        let page = page();
        let err = decider.decide(ctx(&page)).await.unwrap_err();

        mock.assert_async().await;
        match err {
            DecisionError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(last.contains("unknown action"));
            }
            other => panic!("expected exhaustion, got {other}"),
        }
    }

    #[tokio::test]
    async fn transport_errors_are_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/m:generateContent")
            .with_status(503)
            .with_body("overloaded")
            .expect(3)
            .create_async()
            .await;

        let decider = GeminiDecider::new("k", "m").with_endpoint(server.url());
        let page = page();
        let err = decider.decide(ctx(&page)).await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, DecisionError::Exhausted { .. }));
    }

    #[test]
    fn click_without_selector_is_rejected() {
        let err = parse_decision(r#"{"reasoning":"r","action":"click"}"#).unwrap_err();
        assert!(matches!(err, DecisionError::Invalid(_)));
    }

    #[test]
    fn fences_strip_cleanly() {
        assert_eq!(strip_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_fences("  {}  "), "{}");
    }
}
