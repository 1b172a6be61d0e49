// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Stateless HTTP action backend.
//!
//! Simulates browsing over plain HTTP: a click on a link becomes a GET of
//! its resolved href, a click on a form button or a `type` into a field
//! becomes a form submission with the form's fields collected the way a
//! browser would. Cookies persist across requests within one agent, so
//! session-based sites behave normally.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::redirect::Policy;
use scraper::{ElementRef, Html};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::domain::action::{Action, Decision};
use crate::domain::executor::{
    ActionBackend, ActionOutcome, BackendFactory, BackendKind, ExecutorError, PageCapture,
};
use crate::infrastructure::html;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REDIRECTS: usize = 10;
const MAX_FETCH_ATTEMPTS: u32 = 3;
const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9";

/// What a click resolves to once the page is parsed.
enum ClickPlan {
    /// Follow a link's href.
    Follow(String),
    /// Submit the enclosing form.
    Submit(FormPlan),
}

/// A form submission, fully planned before any I/O.
struct FormPlan {
    method: String,
    action: String,
    fields: Vec<(String, String)>,
}

pub struct HttpBackend {
    client: reqwest::Client,
    retry_unit: Duration,
}

impl HttpBackend {
    pub fn new() -> Result<Self, ExecutorError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("stampede/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExecutorError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            retry_unit: Duration::from_secs(1),
        })
    }

    /// Shrink the retry backoff unit. Tests use this to avoid real sleeps.
    #[cfg(test)]
    fn with_retry_unit(mut self, unit: Duration) -> Self {
        self.retry_unit = unit;
        self
    }

    /// GET a page with linear backoff: transient transport errors retry
    /// after `attempt * unit`, 429/5xx responses after `attempt * 2 * unit`.
    /// Returns the body, the final post-redirect URL, and the status.
    async fn fetch_with_retry(
        &self,
        url: &str,
    ) -> Result<(String, String, u16), ExecutorError> {
        let mut last_err = ExecutorError::Transport("no attempts made".to_string());

        for attempt in 1..=MAX_FETCH_ATTEMPTS {
            match self
                .client
                .get(url)
                .header(ACCEPT, ACCEPT_HTML)
                .send()
                .await
            {
                Err(e) => {
                    debug!(url, attempt, error = %e, "fetch failed, retrying");
                    last_err = ExecutorError::Transport(e.to_string());
                    tokio::time::sleep(self.retry_unit * attempt).await;
                }
                Ok(resp) => {
                    let status = resp.status();
                    if status.as_u16() == 429 || status.is_server_error() {
                        debug!(url, attempt, status = status.as_u16(), "retryable status");
                        last_err = ExecutorError::Status(status.as_u16());
                        tokio::time::sleep(self.retry_unit * attempt * 2).await;
                        continue;
                    }
                    let final_url = resp.url().to_string();
                    let body = resp
                        .text()
                        .await
                        .map_err(|e| ExecutorError::Transport(e.to_string()))?;
                    return Ok((body, final_url, status.as_u16()));
                }
            }
        }
        Err(last_err)
    }

    async fn submit_form(
        &self,
        plan: FormPlan,
        page_url: &str,
    ) -> Result<ActionOutcome, ExecutorError> {
        let target = resolve_url(page_url, &plan.action)?;
        debug!(method = %plan.method, url = %target, "submitting form");

        let request = if plan.method == "POST" {
            self.client.post(&target).form(&plan.fields)
        } else {
            self.client
                .get(&target)
                .header(ACCEPT, ACCEPT_HTML)
                .query(&plan.fields)
        };

        let resp = request
            .send()
            .await
            .map_err(|e| ExecutorError::Transport(e.to_string()))?;
        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let html = resp
            .text()
            .await
            .map_err(|e| ExecutorError::Transport(e.to_string()))?;
        Ok(ActionOutcome::Navigated {
            html,
            url: final_url,
            status,
        })
    }

    async fn click(
        &self,
        selector: &str,
        current_url: &str,
    ) -> Result<ActionOutcome, ExecutorError> {
        let (page_html, page_url, _) = self.fetch_with_retry(current_url).await?;
        match plan_click(&page_html, selector)? {
            ClickPlan::Follow(href) => {
                let target = resolve_url(&page_url, &href)?;
                let (html, url, status) = self.fetch_with_retry(&target).await?;
                Ok(ActionOutcome::Navigated { html, url, status })
            }
            ClickPlan::Submit(plan) => self.submit_form(plan, &page_url).await,
        }
    }

    async fn type_into(
        &self,
        selector: &str,
        text: &str,
        current_url: &str,
    ) -> Result<ActionOutcome, ExecutorError> {
        let (page_html, page_url, _) = self.fetch_with_retry(current_url).await?;
        let plan = plan_type(&page_html, selector, text)?;
        self.submit_form(plan, &page_url).await
    }
}

#[async_trait]
impl ActionBackend for HttpBackend {
    async fn execute(
        &mut self,
        decision: &Decision,
        current_url: &str,
    ) -> Result<ActionOutcome, ExecutorError> {
        match decision.action {
            Action::Click => {
                let selector = decision.selector.as_deref().unwrap_or_default();
                self.click(selector, current_url).await
            }
            Action::Type => {
                let selector = decision.selector.as_deref().unwrap_or_default();
                let text = decision.text_input.as_deref().unwrap_or_default();
                self.type_into(selector, text, current_url).await
            }
            Action::Visit => {
                let (html, url, status) = self.fetch_with_retry(current_url).await?;
                Ok(ActionOutcome::Navigated { html, url, status })
            }
            Action::Wait => Ok(ActionOutcome::Unchanged),
            Action::GoBack | Action::Completed | Action::Failed => {
                Err(ExecutorError::UnsupportedAction(decision.action.to_string()))
            }
        }
    }

    async fn capture(&mut self, current_url: &str) -> Result<PageCapture, ExecutorError> {
        let (html, url, status) = self.fetch_with_retry(current_url).await?;
        if !(200..300).contains(&status) {
            return Err(ExecutorError::Status(status));
        }
        Ok(PageCapture { html, url })
    }
}

/// Hands each agent its own [`HttpBackend`] (and thus its own cookie jar).
#[derive(Default)]
pub struct HttpBackendFactory;

impl BackendFactory for HttpBackendFactory {
    fn create(&self, kind: BackendKind) -> anyhow::Result<Box<dyn ActionBackend>> {
        match kind {
            BackendKind::Http => Ok(Box::new(HttpBackend::new()?)),
            BackendKind::Browser => Err(anyhow::anyhow!(
                "browser backend requires a session provider"
            )),
        }
    }
}

/// Resolve `rel` against `base` per RFC 3986. Empty and `#` hrefs point
/// back at the base page.
fn resolve_url(base: &str, rel: &str) -> Result<String, ExecutorError> {
    if rel.is_empty() || rel == "#" {
        return Ok(base.to_string());
    }
    let base = Url::parse(base).map_err(|e| ExecutorError::Url(format!("{base}: {e}")))?;
    let resolved = base
        .join(rel)
        .map_err(|e| ExecutorError::Url(format!("{rel}: {e}")))?;
    Ok(resolved.to_string())
}

fn plan_click(page_html: &str, selector: &str) -> Result<ClickPlan, ExecutorError> {
    let doc = Html::parse_document(page_html);
    let el = html::find_first(&doc, selector)?;

    // An empty href behaves like "#": resolve_url maps it back to the
    // current page.
    if let Some(href) = el.value().attr("href") {
        return Ok(ClickPlan::Follow(href.to_string()));
    }
    match html::closest_form(el) {
        Some(form) => Ok(ClickPlan::Submit(collect_form(form, None, None))),
        None => Err(ExecutorError::ElementNotClickable(selector.to_string())),
    }
}

fn plan_type(page_html: &str, selector: &str, text: &str) -> Result<FormPlan, ExecutorError> {
    let doc = Html::parse_document(page_html);
    let field = html::find_first(&doc, selector)?;
    let form = html::closest_form(field)
        .ok_or_else(|| ExecutorError::FormNotFound(selector.to_string()))?;
    Ok(collect_form(form, Some(field), Some(text)))
}

/// Collect a form's fields the way a browser would on submit: buttons are
/// skipped, unchecked checkboxes and radios are omitted, selects default
/// to their first option, and the focused field (if any) carries the
/// typed text instead of its markup value.
fn collect_form(
    form: ElementRef<'_>,
    focus: Option<ElementRef<'_>>,
    text_input: Option<&str>,
) -> FormPlan {
    let method = form
        .value()
        .attr("method")
        .unwrap_or("GET")
        .to_uppercase();
    let action = form.value().attr("action").unwrap_or_default().to_string();
    let focus_node = focus.map(|f| f.id());

    let mut fields: Vec<(String, String)> = Vec::new();
    let field_sel = scraper::Selector::parse("input, select, textarea").expect("static selector");

    for el in form.select(&field_sel) {
        let value = el.value();
        let name = match value.attr("name") {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => continue,
        };
        let input_type = value.attr("type").unwrap_or_default().to_lowercase();
        if input_type == "submit" || input_type == "button" {
            continue;
        }
        if (input_type == "checkbox" || input_type == "radio")
            && value.attr("checked").is_none()
        {
            continue;
        }

        let field_value = if focus_node == Some(el.id()) {
            text_input.unwrap_or_default().to_string()
        } else if value.name() == "select" {
            first_option_value(el)
        } else {
            value.attr("value").unwrap_or_default().to_string()
        };

        match fields.iter_mut().find(|(n, _)| *n == name) {
            Some(existing) => existing.1 = field_value,
            None => fields.push((name, field_value)),
        }
    }

    FormPlan {
        method,
        action,
        fields,
    }
}

fn first_option_value(select: ElementRef<'_>) -> String {
    let option_sel = scraper::Selector::parse("option").expect("static selector");
    select
        .select(&option_sel)
        .next()
        .map(|opt| match opt.value().attr("value") {
            Some(v) if !v.is_empty() => v.to_string(),
            _ => opt.text().collect::<String>().trim().to_string(),
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn backend() -> HttpBackend {
        HttpBackend::new()
            .unwrap()
            .with_retry_unit(Duration::from_millis(1))
    }

    fn click_decision(selector: &str) -> Decision {
        Decision {
            reasoning: "test".to_string(),
            action: Action::Click,
            selector: Some(selector.to_string()),
            text_input: None,
            expected_next_state: None,
        }
    }

    #[tokio::test]
    async fn click_follows_a_link() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .with_body(r#"<html><body><a id="next" href="/page2">next</a></body></html>"#)
            .create_async()
            .await;
        let page2 = server
            .mock("GET", "/page2")
            .with_body("<html><body><h1>page two</h1></body></html>")
            .create_async()
            .await;

        let mut backend = backend();
        let outcome = backend
            .execute(&click_decision("#next"), &server.url())
            .await
            .unwrap();

        page2.assert_async().await;
        match outcome {
            ActionOutcome::Navigated { url, status, .. } => {
                assert!(url.ends_with("/page2"));
                assert_eq!(status, 200);
            }
            other => panic!("expected navigation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn click_on_empty_href_reloads_the_page() {
        let mut server = mockito::Server::new_async().await;
        let home = server
            .mock("GET", "/")
            .with_body(r#"<html><body><a id="self" href="">reload</a></body></html>"#)
            .expect(2)
            .create_async()
            .await;

        let mut backend = backend();
        let outcome = backend
            .execute(&click_decision("#self"), &server.url())
            .await
            .unwrap();

        home.assert_async().await;
        match outcome {
            ActionOutcome::Navigated { url, status, .. } => {
                assert_eq!(status, 200);
                assert!(url.ends_with('/'));
            }
            other => panic!("expected navigation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn click_on_form_button_submits_the_form() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .with_body(
                r#"<html><body>
                <form action="/login" method="post">
                    <input type="text" name="user" value="alice">
                    <input type="hidden" name="csrf" value="tok">
                    <button id="go" type="submit">Log in</button>
                </form>
                </body></html>"#,
            )
            .create_async()
            .await;
        let submit = server
            .mock("POST", "/login")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("user".to_string(), "alice".to_string()),
                Matcher::UrlEncoded("csrf".to_string(), "tok".to_string()),
            ]))
            .with_body("<html><body>welcome</body></html>")
            .create_async()
            .await;

        let mut backend = backend();
        let outcome = backend
            .execute(&click_decision("#go"), &server.url())
            .await
            .unwrap();

        submit.assert_async().await;
        assert!(matches!(outcome, ActionOutcome::Navigated { .. }));
    }

    #[tokio::test]
    async fn type_submits_enclosing_form_with_typed_text() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .with_body(
                r#"<html><body>
                <form action="/search" method="get">
                    <input type="text" name="q" value="stale">
                    <input type="submit" value="Go">
                </form>
                </body></html>"#,
            )
            .create_async()
            .await;
        let search = server
            .mock("GET", "/search")
            .match_query(Matcher::UrlEncoded("q".to_string(), "rust".to_string()))
            .with_body("<html><body>results</body></html>")
            .create_async()
            .await;

        let decision = Decision {
            reasoning: "search".to_string(),
            action: Action::Type,
            selector: Some("input[name='q']".to_string()),
            text_input: Some("rust".to_string()),
            expected_next_state: None,
        };
        let mut backend = backend();
        let outcome = backend.execute(&decision, &server.url()).await.unwrap();

        search.assert_async().await;
        assert!(matches!(outcome, ActionOutcome::Navigated { .. }));
    }

    #[tokio::test]
    async fn missing_element_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .with_body("<html><body>nothing here</body></html>")
            .create_async()
            .await;

        let mut backend = backend();
        let err = backend
            .execute(&click_decision("#ghost"), &server.url())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::ElementNotFound(_)));
    }

    #[tokio::test]
    async fn server_errors_are_retried_then_surfaced() {
        let mut server = mockito::Server::new_async().await;
        let flaky = server
            .mock("GET", "/")
            .with_status(500)
            .expect(3)
            .create_async()
            .await;

        let mut backend = backend();
        let err = backend.capture(&server.url()).await.unwrap_err();

        flaky.assert_async().await;
        assert!(matches!(err, ExecutorError::Status(500)));
    }

    #[tokio::test]
    async fn wait_is_a_noop() {
        let decision = Decision {
            reasoning: "pause".to_string(),
            action: Action::Wait,
            selector: None,
            text_input: None,
            expected_next_state: None,
        };
        let mut backend = backend();
        let outcome = backend
            .execute(&decision, "https://example.com/")
            .await
            .unwrap();
        assert!(matches!(outcome, ActionOutcome::Unchanged));
    }

    #[test]
    fn relative_urls_resolve_against_the_page() {
        assert_eq!(
            resolve_url("https://example.com/a/b", "../c").unwrap(),
            "https://example.com/c"
        );
        assert_eq!(
            resolve_url("https://example.com/a", "#").unwrap(),
            "https://example.com/a"
        );
        assert_eq!(
            resolve_url("https://example.com/a", "https://other.com/x").unwrap(),
            "https://other.com/x"
        );
    }

    #[test]
    fn form_collection_skips_buttons_and_unchecked_boxes() {
        let doc = Html::parse_document(
            r#"<form method="POST" action="/f">
                <input type="text" name="a" value="1">
                <input type="checkbox" name="opt" value="on">
                <input type="checkbox" name="keep" value="yes" checked>
                <input type="radio" name="r" value="x">
                <input type="submit" name="submit" value="Send">
                <select name="s"><option value="first">First</option><option value="second">Second</option></select>
            </form>"#,
        );
        let form = html::find_first(&doc, "form").unwrap();
        let plan = collect_form(form, None, None);

        assert_eq!(plan.method, "POST");
        assert_eq!(plan.action, "/f");
        assert_eq!(
            plan.fields,
            vec![
                ("a".to_string(), "1".to_string()),
                ("keep".to_string(), "yes".to_string()),
                ("s".to_string(), "first".to_string()),
            ]
        );
    }
}
