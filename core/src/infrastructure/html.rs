// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTML snapshot parser and selector generation.
//!
//! Turns raw HTML into the [`PageSnapshot`] handed to the decision policy:
//! title, meta description, normalized text content, and the interactive
//! surface (links, buttons, inputs, forms), each addressed by a short
//! generated CSS selector.
//!
//! All functions here are synchronous; `scraper`'s DOM types are not
//! `Send` and must never be held across an await point.

use chrono::Utc;
use scraper::{ElementRef, Html, Selector};

use crate::domain::executor::ExecutorError;
use crate::domain::page::{Element, ElementKind, PageSnapshot};

const DESCRIPTION_MAX: usize = 500;
const ELEMENT_TEXT_MAX: usize = 100;
const TEXT_CONTENT_MAX: usize = 2000;
/// Selectors keep at most this many trailing path segments.
const SELECTOR_MAX_SEGMENTS: usize = 3;

/// Parse a static selector that is known-valid at compile time.
fn static_sel(s: &str) -> Selector {
    Selector::parse(s).expect("static selector")
}

/// Parse a fetched document into a policy-facing snapshot.
pub fn parse_page(url: &str, html: &str) -> PageSnapshot {
    let doc = Html::parse_document(html);

    let title = doc
        .select(&static_sel("title"))
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let description = meta_description(&doc)
        .map(|d| truncate(&d, DESCRIPTION_MAX))
        .unwrap_or_default();

    let text_content = doc
        .select(&static_sel("body"))
        .next()
        .map(|body| {
            let raw = body.text().collect::<Vec<_>>().join(" ");
            truncate(&normalize_whitespace(&raw), TEXT_CONTENT_MAX)
        })
        .unwrap_or_default();

    PageSnapshot {
        url: url.to_string(),
        title,
        description,
        text_content,
        interactive_elements: extract_elements(&doc),
        timestamp: Utc::now(),
    }
}

fn meta_description(doc: &Html) -> Option<String> {
    doc.select(&static_sel("meta[name='description']"))
        .next()
        .and_then(|m| m.value().attr("content"))
        .or_else(|| {
            doc.select(&static_sel("meta[property='og:description']"))
                .next()
                .and_then(|m| m.value().attr("content"))
        })
        .map(str::to_string)
}

/// Extract the interactive surface in document order: clickables first,
/// then inputs, then forms.
fn extract_elements(doc: &Html) -> Vec<Element> {
    let mut elements = Vec::new();

    for clickable in doc.select(&static_sel("a, button, [onclick], [role='button']")) {
        let selector = generate_selector(clickable);
        let value = clickable.value();

        if value.name() == "a" {
            let href = value.attr("href").unwrap_or_default();
            let looks_clickable = !href.is_empty()
                || value.classes().any(|c| c == "btn" || c == "button");
            if !looks_clickable {
                continue;
            }
            let text = element_text(clickable);
            elements.push(Element {
                id: element_id(elements.len()),
                kind: ElementKind::Link,
                text: Some(truncate(&text, ELEMENT_TEXT_MAX)),
                selector,
                href: Some(href.to_string()),
                name: None,
                placeholder: None,
                input_type: None,
            });
        } else {
            let mut text = element_text(clickable);
            if text.is_empty() {
                text = value
                    .attr("value")
                    .or_else(|| value.attr("aria-label"))
                    .unwrap_or_default()
                    .to_string();
            }
            elements.push(Element {
                id: element_id(elements.len()),
                kind: ElementKind::Button,
                text: Some(truncate(&text, ELEMENT_TEXT_MAX)),
                selector,
                href: None,
                name: None,
                placeholder: None,
                input_type: None,
            });
        }
    }

    for input in doc.select(&static_sel("input, textarea, select")) {
        let value = input.value();
        let input_type = value.attr("type").unwrap_or("text");
        if input_type == "hidden" {
            continue;
        }
        elements.push(Element {
            id: element_id(elements.len()),
            kind: ElementKind::Input,
            text: None,
            selector: generate_selector(input),
            href: None,
            name: value.attr("name").map(str::to_string),
            placeholder: value.attr("placeholder").map(str::to_string),
            input_type: Some(input_type.to_string()),
        });
    }

    for form in doc.select(&static_sel("form")) {
        let value = form.value();
        let method = value.attr("method").unwrap_or("GET").to_uppercase();
        let action = value.attr("action").unwrap_or_default();
        elements.push(Element {
            id: element_id(elements.len()),
            kind: ElementKind::Form,
            text: Some(format!("{} {}", method, action)),
            selector: generate_selector(form),
            href: None,
            name: None,
            placeholder: None,
            input_type: None,
        });
    }

    elements
}

/// Generate a short CSS selector for an element.
///
/// Walks from the node up through its ancestors, preferring `#id`
/// (which also terminates the walk), falling back to the class list,
/// falling back to `tag:nth-child(k)` counted over element siblings.
/// Only the last [`SELECTOR_MAX_SEGMENTS`] segments are kept — short, and
/// still unique enough in practice.
pub fn generate_selector(el: ElementRef<'_>) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut current = Some(*el);

    while let Some(node) = current {
        if let Some(elem) = ElementRef::wrap(node) {
            let value = elem.value();
            let tag = value.name();

            if let Some(id) = value.id().filter(|id| !id.is_empty()) {
                parts.insert(0, format!("{tag}#{id}"));
                break;
            }

            let classes: Vec<&str> = value.classes().collect();
            let part = if !classes.is_empty() {
                format!("{tag}.{}", classes.join("."))
            } else {
                let position = node
                    .prev_siblings()
                    .filter(|sibling| sibling.value().is_element())
                    .count()
                    + 1;
                format!("{tag}:nth-child({position})")
            };
            parts.insert(0, part);
        }
        current = node.parent();
    }

    if parts.len() > SELECTOR_MAX_SEGMENTS {
        parts = parts.split_off(parts.len() - SELECTOR_MAX_SEGMENTS);
    }
    parts.join(" ")
}

/// Find the first element matching `selector`.
pub fn find_first<'a>(doc: &'a Html, selector: &str) -> Result<ElementRef<'a>, ExecutorError> {
    let parsed = Selector::parse(selector)
        .map_err(|_| ExecutorError::InvalidSelector(selector.to_string()))?;
    doc.select(&parsed)
        .next()
        .ok_or_else(|| ExecutorError::ElementNotFound(selector.to_string()))
}

/// Nearest enclosing `<form>`, including the element itself.
pub fn closest_form(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    std::iter::once(*el)
        .chain(el.ancestors())
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "form")
}

fn element_text(el: ElementRef<'_>) -> String {
    normalize_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

fn element_id(n: usize) -> String {
    format!("elem_{n}")
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push_str("...");
    out
}
