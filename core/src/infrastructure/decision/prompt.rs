// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Prompt assembly for the decision policy.

use crate::domain::decision::DecisionContext;
use crate::domain::page::ElementKind;

/// Only the most recent history entries are shown to the policy.
const HISTORY_WINDOW: usize = 10;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an autonomous web-testing agent. \
You are given a goal, the current page, and your recent actions. \
Explore the site like a curious user trying to accomplish the goal: follow links, \
fill and submit forms, and back out of dead ends. Prefer elements that plausibly \
advance the goal over random clicking.";

const OUTPUT_CONTRACT: &str = r#"
Respond with a single JSON object and nothing else. No markdown, no prose around it.

{
  "reasoning": "one sentence on why this action advances the goal",
  "action": "click | type | wait | go_back | visit | completed | failed",
  "selector": "CSS selector of the target element (required for click and type)",
  "text_input": "text to enter (required for type)",
  "expected_next_state": "what you expect the page to show afterwards"
}

Rules:
- "click" and "type" require "selector", copied exactly from the element list.
- "type" additionally requires "text_input".
- Use "completed" when the goal is achieved, "failed" when it is unreachable.
- Use "go_back" to retreat from a dead end, "wait" to observe without acting."#;

/// Mission system prompt plus the fixed output contract.
pub fn build_system_prompt(mission_prompt: &str) -> String {
    let base = if mission_prompt.trim().is_empty() {
        DEFAULT_SYSTEM_PROMPT
    } else {
        mission_prompt
    };
    format!("{base}\n{OUTPUT_CONTRACT}")
}

/// Render one step's context: goal, page summary, interactive elements,
/// and the tail of the action history.
pub fn build_user_prompt(ctx: &DecisionContext<'_>) -> String {
    let mut out = String::new();

    out.push_str(&format!("GOAL: {}\n\n", ctx.goal));
    out.push_str(&format!(
        "CURRENT PAGE:\nURL: {}\nTitle: {}\n",
        ctx.page.url, ctx.page.title
    ));
    if !ctx.page.description.is_empty() {
        out.push_str(&format!("Description: {}\n", ctx.page.description));
    }
    if !ctx.page.text_content.is_empty() {
        out.push_str(&format!("Page text: {}\n", ctx.page.text_content));
    }

    out.push_str("\nINTERACTIVE ELEMENTS:\n");
    if ctx.page.interactive_elements.is_empty() {
        out.push_str("(none found)\n");
    }
    for (i, el) in ctx.page.interactive_elements.iter().enumerate() {
        let text = el.text.as_deref().unwrap_or_default();
        out.push_str(&format!(
            "{}. [{}] \"{}\" selector: {}",
            i + 1,
            kind_label(el.kind),
            text,
            el.selector
        ));
        if let Some(href) = el.href.as_deref().filter(|h| !h.is_empty()) {
            out.push_str(&format!(" href: {href}"));
        }
        if let Some(placeholder) = el.placeholder.as_deref() {
            out.push_str(&format!(" placeholder: {placeholder}"));
        }
        if let Some(name) = el.name.as_deref() {
            out.push_str(&format!(" name: {name}"));
        }
        out.push('\n');
    }

    if !ctx.history.is_empty() {
        out.push_str("\nRECENT ACTIONS:\n");
        let start = ctx.history.len().saturating_sub(HISTORY_WINDOW);
        for entry in &ctx.history[start..] {
            out.push_str(&format!("- {entry}\n"));
        }
    }

    out.push_str("\nDecide the next action.");
    out
}

fn kind_label(kind: ElementKind) -> &'static str {
    match kind {
        ElementKind::Link => "link",
        ElementKind::Button => "button",
        ElementKind::Input => "input",
        ElementKind::Form => "form",
    }
}
