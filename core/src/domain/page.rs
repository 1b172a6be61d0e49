// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Page snapshots — the simplified, JSON-friendly view of a page's
//! interactive surface handed to the decision policy.
//!
//! Snapshots are rebuilt fresh on every agent step and never mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind tag for an interactive element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Link,
    Button,
    Input,
    Form,
}

/// One interactive element on a page, addressed by a generated CSS selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ElementKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub selector: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
}

/// Stripped-down view of a fetched page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub description: String,
    pub text_content: String,
    pub interactive_elements: Vec<Element>,
    pub timestamp: DateTime<Utc>,
}
