//! The built-in browser toolset, driven over the DevTools protocol.
//!
//! Element targets accept three forms, tried in order: a snapshot ref
//! (`e3` or `ref=e3`), a CSS selector, and finally visible text.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};
use webpilot_core::{Error, Result};

use super::session::{BrowserHandle, BrowserSession};
use super::snapshot::{parse_ax_tree, render_snapshot};
use crate::markdown::html_to_markdown;
use crate::{resolve_secret_placeholders, safe_truncate, Tool, ToolContext, ToolSchema};

/// Page content returned to the model is capped at this many characters.
const PAGE_CONTENT_LIMIT: usize = 2000;

fn browser_handle(ctx: &ToolContext) -> Result<BrowserHandle> {
    ctx.browser
        .clone()
        .ok_or_else(|| Error::Backend("No browser session attached to this run".into()))
}

/// Escape a string for embedding inside a single-quoted JS literal.
fn js_escape(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

/// Snapshot the accessibility tree, refresh the session's ref table, and
/// return the rendered outline.
async fn take_snapshot(session: &mut BrowserSession) -> Result<String> {
    let tree = session.client.get_accessibility_tree().await?;
    let (nodes, root) = parse_ax_tree(&tree);
    let (text, refs) = render_snapshot(&nodes, root);
    session.refs = refs;
    Ok(text)
}

async fn current_url_and_title(session: &BrowserSession) -> Result<(String, String)> {
    let result = session
        .client
        .evaluate_js("JSON.stringify({url: location.href, title: document.title})")
        .await?;
    let raw = result
        .pointer("/result/value")
        .and_then(|v| v.as_str())
        .unwrap_or("{}");
    let parsed: Value = serde_json::from_str(raw).unwrap_or_default();
    Ok((
        parsed.get("url").and_then(|v| v.as_str()).unwrap_or("").to_string(),
        parsed.get("title").and_then(|v| v.as_str()).unwrap_or("").to_string(),
    ))
}

/// Resolve a target string to a backend node ID via the snapshot ref table.
fn resolve_ref(session: &BrowserSession, target: &str) -> Option<i64> {
    let key = target.strip_prefix("ref=").unwrap_or(target);
    session.refs.get(key).map(|r| r.backend_node_id)
}

/// Click an element by backend node ID: box-model center click, falling back
/// to a synthesized DOM click when the element has no box (e.g. off-screen).
async fn click_by_backend_node(session: &BrowserSession, backend_node_id: i64) -> Result<()> {
    let box_model = session
        .client
        .send_command("DOM.getBoxModel", json!({"backendNodeId": backend_node_id}))
        .await;

    if let Ok(model) = box_model {
        if let Some((x, y)) = extract_center(&model) {
            session
                .client
                .dispatch_mouse_event("mousePressed", x, y, "left", 1)
                .await?;
            session
                .client
                .dispatch_mouse_event("mouseReleased", x, y, "left", 1)
                .await?;
            return Ok(());
        }
    }

    // No box model: scroll into view and click through the DOM instead
    let resolved = session
        .client
        .send_command("DOM.resolveNode", json!({"backendNodeId": backend_node_id}))
        .await?;
    let object_id = resolved
        .pointer("/object/objectId")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Tool("Element could not be resolved for clicking".into()))?;

    session
        .client
        .send_command(
            "Runtime.callFunctionOn",
            json!({
                "objectId": object_id,
                "functionDeclaration": "function() { this.scrollIntoView({block: 'center'}); this.click(); }",
            }),
        )
        .await?;
    Ok(())
}

/// Click the first element matching a CSS selector. Returns an error if
/// nothing matches.
async fn click_by_selector(session: &BrowserSession, selector: &str) -> Result<()> {
    let expr = format!(
        "(() => {{ const el = document.querySelector('{}'); if (!el) return false; \
         el.scrollIntoView({{block: 'center'}}); el.click(); return true; }})()",
        js_escape(selector)
    );
    let result = session.client.evaluate_js(&expr).await?;
    let clicked = result
        .pointer("/result/value")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if clicked {
        Ok(())
    } else {
        Err(Error::NotFound(format!(
            "No element matches selector '{}'",
            selector
        )))
    }
}

/// Click the first clickable element whose visible text contains the target.
async fn click_by_text(session: &BrowserSession, text: &str) -> Result<()> {
    let expr = format!(
        "(() => {{ const needle = '{}'; \
         const candidates = document.querySelectorAll('a, button, input[type=submit], input[type=button], [role=button], [onclick]'); \
         for (const el of candidates) {{ \
           const label = (el.innerText || el.value || '').trim(); \
           if (label.includes(needle)) {{ el.scrollIntoView({{block: 'center'}}); el.click(); return true; }} \
         }} return false; }})()",
        js_escape(text)
    );
    let result = session.client.evaluate_js(&expr).await?;
    let clicked = result
        .pointer("/result/value")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if clicked {
        Ok(())
    } else {
        Err(Error::NotFound(format!(
            "No clickable element with visible text '{}'",
            text
        )))
    }
}

/// Focus an element by target, using the same ref / selector resolution
/// order as clicking.
async fn focus_target(session: &BrowserSession, target: &str) -> Result<()> {
    if let Some(backend_node_id) = resolve_ref(session, target) {
        session
            .client
            .send_command("DOM.focus", json!({"backendNodeId": backend_node_id}))
            .await?;
        return Ok(());
    }

    let expr = format!(
        "(() => {{ const el = document.querySelector('{}'); if (!el) return false; \
         el.scrollIntoView({{block: 'center'}}); el.focus(); return true; }})()",
        js_escape(target)
    );
    let result = session.client.evaluate_js(&expr).await?;
    let focused = result
        .pointer("/result/value")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if focused {
        Ok(())
    } else {
        Err(Error::NotFound(format!(
            "No focusable element matches '{}'",
            target
        )))
    }
}

fn extract_center(box_model: &Value) -> Option<(f64, f64)> {
    // Content quad is 8 numbers: x1 y1 x2 y2 x3 y3 x4 y4
    let quad = box_model.pointer("/model/content")?.as_array()?;
    if quad.len() < 8 {
        return None;
    }
    let xs: Vec<f64> = [0, 2, 4, 6].iter().filter_map(|&i| quad[i].as_f64()).collect();
    let ys: Vec<f64> = [1, 3, 5, 7].iter().filter_map(|&i| quad[i].as_f64()).collect();
    if xs.len() < 4 || ys.len() < 4 {
        return None;
    }
    Some((xs.iter().sum::<f64>() / 4.0, ys.iter().sum::<f64>() / 4.0))
}

/// Parse a key spec like "Enter" or "Control+Shift+T" into
/// (key, code, CDP modifier bits).
fn parse_key_spec(spec: &str) -> Result<(String, String, i32)> {
    let parts: Vec<&str> = spec.split('+').map(str::trim).collect();
    let (modifier_parts, key_part) = match parts.split_last() {
        Some((key, mods)) if !key.is_empty() => (mods, *key),
        _ => return Err(Error::Validation(format!("Empty key spec: '{}'", spec))),
    };

    let mut modifiers = 0;
    for m in modifier_parts {
        modifiers |= match m.to_lowercase().as_str() {
            "ctrl" | "control" => 2,
            "alt" => 1,
            "shift" => 8,
            "meta" | "cmd" | "command" => 4,
            other => {
                return Err(Error::Validation(format!(
                    "Unknown modifier '{}' in key spec '{}'",
                    other, spec
                )))
            }
        };
    }

    let code = match key_part {
        "Enter" | "Tab" | "Escape" | "Backspace" | "Delete" | "ArrowUp" | "ArrowDown"
        | "ArrowLeft" | "ArrowRight" | "Home" | "End" | "PageUp" | "PageDown" => {
            key_part.to_string()
        }
        "Space" | " " => "Space".to_string(),
        single if single.chars().count() == 1 => {
            let c = single.chars().next().unwrap_or_default();
            if c.is_ascii_alphanumeric() {
                format!("Key{}", c.to_ascii_uppercase())
            } else {
                String::new()
            }
        }
        other => {
            return Err(Error::Validation(format!("Unsupported key: '{}'", other)));
        }
    };

    let key = if key_part == "Space" { " ".to_string() } else { key_part.to_string() };
    Ok((key, code, modifiers))
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

pub struct NavigateToUrlTool;

#[async_trait]
impl Tool for NavigateToUrlTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "navigate_to_url",
            description: "Navigate the browser to a URL and return the resulting page state (title, URL, and interactive elements).",
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "Absolute URL to open, including scheme"}
                },
                "required": ["url"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        let url = params
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Validation("navigate_to_url requires 'url'".into()))?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(Error::Validation(format!(
                "URL must start with http:// or https://, got '{}'",
                url
            )));
        }
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let url = params["url"].as_str().unwrap_or_default();
        let handle = browser_handle(&ctx)?;
        let mut session = handle.lock().await;

        info!(url = %url, "Navigating");
        session.client.navigate(url).await?;
        // Give the page a moment to settle before snapshotting
        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;

        let snapshot = take_snapshot(&mut session).await?;
        let (current_url, title) = current_url_and_title(&session).await?;
        Ok(json!({
            "url": current_url,
            "title": title,
            "elements": snapshot,
        }))
    }
}

pub struct GetPageStateTool;

#[async_trait]
impl Tool for GetPageStateTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_page_state",
            description: "Get the current page's URL, title, and an outline of interactive elements. Each element carries a ref (e.g. ref=e3) usable with click_element and fill_input.",
            parameters: json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<Value> {
        let handle = browser_handle(&ctx)?;
        let mut session = handle.lock().await;

        let snapshot = take_snapshot(&mut session).await?;
        let (url, title) = current_url_and_title(&session).await?;
        Ok(json!({
            "url": url,
            "title": title,
            "elements": snapshot,
        }))
    }
}

pub struct GetPageContentTool;

#[async_trait]
impl Tool for GetPageContentTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_page_content",
            description: "Get the page's readable content as Markdown, truncated to 2000 characters. Use this to read articles, prices, or other text the element outline doesn't show.",
            parameters: json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<Value> {
        let handle = browser_handle(&ctx)?;
        let session = handle.lock().await;

        let result = session
            .client
            .evaluate_js("document.documentElement.outerHTML")
            .await?;
        let html = result
            .pointer("/result/value")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        let markdown = html_to_markdown(html);
        let truncated = markdown.chars().count() > PAGE_CONTENT_LIMIT;
        Ok(json!({
            "content": safe_truncate(&markdown, PAGE_CONTENT_LIMIT),
            "truncated": truncated,
        }))
    }
}

pub struct ClickElementTool;

#[async_trait]
impl Tool for ClickElementTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "click_element",
            description: "Click an element. Target can be a snapshot ref (e.g. 'e3' or 'ref=e3'), a CSS selector, or visible text on a button or link.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "target": {"type": "string", "description": "Snapshot ref, CSS selector, or visible text"}
                },
                "required": ["target"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        match params.get("target").and_then(|v| v.as_str()) {
            Some(t) if !t.trim().is_empty() => Ok(()),
            _ => Err(Error::Validation("click_element requires 'target'".into())),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let target = params["target"].as_str().unwrap_or_default();
        let handle = browser_handle(&ctx)?;
        let session = handle.lock().await;

        if let Some(backend_node_id) = resolve_ref(&session, target) {
            debug!(target = %target, backend_node_id, "Clicking by ref");
            click_by_backend_node(&session, backend_node_id).await?;
            return Ok(json!({"clicked": target, "via": "ref"}));
        }

        // Not a known ref: try as a CSS selector, then as visible text
        match click_by_selector(&session, target).await {
            Ok(()) => Ok(json!({"clicked": target, "via": "selector"})),
            Err(Error::NotFound(_)) => {
                click_by_text(&session, target).await?;
                Ok(json!({"clicked": target, "via": "text"}))
            }
            Err(e) => Err(e),
        }
    }
}

pub struct FillInputTool;

#[async_trait]
impl Tool for FillInputTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "fill_input",
            description: "Clear an input field and type a value into it. Target accepts the same forms as click_element. Secret placeholders like {{MY_SECRET}} are substituted from configuration without being shown.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "target": {"type": "string", "description": "Snapshot ref or CSS selector of the input"},
                    "value": {"type": "string", "description": "Text to enter"}
                },
                "required": ["target", "value"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        if params.get("target").and_then(|v| v.as_str()).is_none() {
            return Err(Error::Validation("fill_input requires 'target'".into()));
        }
        if params.get("value").and_then(|v| v.as_str()).is_none() {
            return Err(Error::Validation("fill_input requires 'value'".into()));
        }
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let target = params["target"].as_str().unwrap_or_default();
        let raw_value = params["value"].as_str().unwrap_or_default();
        // Substitute secrets only here, at the input boundary. Logs and the
        // returned result keep the placeholder form.
        let value = resolve_secret_placeholders(raw_value, &ctx.config);

        let handle = browser_handle(&ctx)?;
        let session = handle.lock().await;

        focus_target(&session, target).await?;
        session
            .client
            .evaluate_js(
                "(() => { const el = document.activeElement; if (el && 'value' in el) el.value = ''; })()",
            )
            .await?;
        session.client.insert_text(&value).await?;
        // Frameworks listen for input events, not raw value changes
        session
            .client
            .evaluate_js(
                "(() => { const el = document.activeElement; if (el) { \
                 el.dispatchEvent(new Event('input', {bubbles: true})); \
                 el.dispatchEvent(new Event('change', {bubbles: true})); } })()",
            )
            .await?;

        info!(target = %target, value = %raw_value, "Filled input");
        Ok(json!({"filled": target, "value": raw_value}))
    }
}

pub struct TypeTextTool;

#[async_trait]
impl Tool for TypeTextTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "type_text",
            description: "Type text into whatever element currently has focus. Secret placeholders like {{MY_SECRET}} are substituted from configuration.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string", "description": "Text to type"}
                },
                "required": ["text"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        if params.get("text").and_then(|v| v.as_str()).is_none() {
            return Err(Error::Validation("type_text requires 'text'".into()));
        }
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let raw_text = params["text"].as_str().unwrap_or_default();
        let text = resolve_secret_placeholders(raw_text, &ctx.config);

        let handle = browser_handle(&ctx)?;
        let session = handle.lock().await;
        session.client.insert_text(&text).await?;

        Ok(json!({"typed": raw_text}))
    }
}

pub struct PressKeyTool;

#[async_trait]
impl Tool for PressKeyTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "press_key",
            description: "Press a key or key combination, e.g. 'Enter', 'Tab', 'Escape', 'ArrowDown', or 'Control+a'.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "key": {"type": "string", "description": "Key name, optionally prefixed with Control+, Alt+, Shift+, or Meta+"}
                },
                "required": ["key"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        let spec = params
            .get("key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Validation("press_key requires 'key'".into()))?;
        parse_key_spec(spec).map(|_| ())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let spec = params["key"].as_str().unwrap_or_default();
        let (key, code, modifiers) = parse_key_spec(spec)?;

        let handle = browser_handle(&ctx)?;
        let session = handle.lock().await;
        session
            .client
            .dispatch_key_event("keyDown", &key, &code, modifiers)
            .await?;
        session
            .client
            .dispatch_key_event("keyUp", &key, &code, modifiers)
            .await?;

        Ok(json!({"pressed": spec}))
    }
}

pub struct WaitForNavigationTool;

#[async_trait]
impl Tool for WaitForNavigationTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "wait_for_navigation",
            description: "Wait until the current page finishes loading (document.readyState is 'complete'). Use after clicking a link or submitting a form.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "timeout_secs": {"type": "integer", "description": "Maximum seconds to wait (default 10)"}
                }
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let timeout_secs = params
            .get("timeout_secs")
            .and_then(|v| v.as_u64())
            .unwrap_or(10);

        let handle = browser_handle(&ctx)?;
        let session = handle.lock().await;

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(timeout_secs);
        loop {
            let result = session.client.evaluate_js("document.readyState").await?;
            let state = result
                .pointer("/result/value")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            if state == "complete" {
                let (url, title) = current_url_and_title(&session).await?;
                return Ok(json!({"url": url, "title": title, "state": "complete"}));
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Timeout(format!(
                    "Page did not finish loading within {}s (readyState: {})",
                    timeout_secs, state
                )));
            }
            tokio::time::sleep(std::time::Duration::from_millis(250)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_spec_plain() {
        let (key, code, mods) = parse_key_spec("Enter").unwrap();
        assert_eq!(key, "Enter");
        assert_eq!(code, "Enter");
        assert_eq!(mods, 0);
    }

    #[test]
    fn test_parse_key_spec_combo() {
        let (key, code, mods) = parse_key_spec("Control+Shift+a").unwrap();
        assert_eq!(key, "a");
        assert_eq!(code, "KeyA");
        assert_eq!(mods, 2 | 8);
    }

    #[test]
    fn test_parse_key_spec_meta() {
        let (_, _, mods) = parse_key_spec("Meta+Enter").unwrap();
        assert_eq!(mods, 4);
    }

    #[test]
    fn test_parse_key_spec_rejects_unknown() {
        assert!(parse_key_spec("SuperDuper").is_err());
        assert!(parse_key_spec("Hyper+x").is_err());
        assert!(parse_key_spec("").is_err());
    }

    #[test]
    fn test_js_escape() {
        assert_eq!(js_escape("it's"), "it\\'s");
        assert_eq!(js_escape("a\\b"), "a\\\\b");
        assert_eq!(js_escape("line\nbreak"), "line\\nbreak");
    }

    #[test]
    fn test_extract_center() {
        let model = json!({"model": {"content": [0.0, 0.0, 10.0, 0.0, 10.0, 20.0, 0.0, 20.0]}});
        let (x, y) = extract_center(&model).unwrap();
        assert_eq!(x, 5.0);
        assert_eq!(y, 10.0);
    }

    #[test]
    fn test_extract_center_malformed() {
        assert!(extract_center(&json!({})).is_none());
        assert!(extract_center(&json!({"model": {"content": [1.0, 2.0]}})).is_none());
    }

    #[test]
    fn test_navigate_validate_rejects_schemeless() {
        let tool = NavigateToUrlTool;
        assert!(tool.validate(&json!({"url": "example.com"})).is_err());
        assert!(tool.validate(&json!({"url": "https://example.com"})).is_ok());
        assert!(tool.validate(&json!({})).is_err());
    }

    #[test]
    fn test_click_validate_rejects_blank_target() {
        let tool = ClickElementTool;
        assert!(tool.validate(&json!({"target": "  "})).is_err());
        assert!(tool.validate(&json!({"target": "e3"})).is_ok());
    }

    #[test]
    fn test_fill_validate_requires_both_fields() {
        let tool = FillInputTool;
        assert!(tool.validate(&json!({"target": "e1"})).is_err());
        assert!(tool.validate(&json!({"value": "x"})).is_err());
        assert!(tool.validate(&json!({"target": "e1", "value": "x"})).is_ok());
    }
}
