pub mod browser;
pub mod control;
pub mod markdown;
pub mod mcp;
pub mod registry;

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use webpilot_core::{Config, Result};

pub use browser::session::BrowserHandle;
pub use registry::ToolRegistry;

/// Truncate a string to at most `max_chars` characters. Counts characters,
/// not bytes, so multibyte text gets the full budget.
pub fn safe_truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

#[derive(Debug, Default)]
struct SignalState {
    completed: bool,
    summary: Option<String>,
}

/// Shared flags a tool can raise to signal the run is over. Checked by the
/// orchestration loop after every tool batch.
#[derive(Clone, Default)]
pub struct RunSignals {
    inner: Arc<Mutex<SignalState>>,
}

impl RunSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn complete(&self, summary: &str) {
        let mut state = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        state.completed = true;
        state.summary = Some(summary.to_string());
    }

    pub fn is_complete(&self) -> bool {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).completed
    }

    pub fn summary(&self) -> Option<String> {
        self.inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .summary
            .clone()
    }
}

#[derive(Clone)]
pub struct ToolContext {
    pub workspace: PathBuf,
    pub config: Config,
    /// Live browser session shared by the basic toolset. None in MCP mode.
    pub browser: Option<BrowserHandle>,
    pub signals: RunSignals,
}

impl ToolContext {
    pub fn new(workspace: PathBuf, config: Config) -> Self {
        Self {
            workspace,
            config,
            browser: None,
            signals: RunSignals::new(),
        }
    }
}

pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;

    /// Check parameters before execution. Tools without required parameters
    /// can rely on the default.
    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value>;
}

/// Resolve `{{NAME}}` secret placeholders against the config secret store.
/// Unknown placeholders are left untouched so the failure is visible to the
/// model instead of silently typing a literal brace pair.
pub fn resolve_secret_placeholders(text: &str, config: &Config) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        if let Some(end) = after.find("}}") {
            let name = after[..end].trim();
            match config.secret(name) {
                Some(value) => out.push_str(&value),
                None => {
                    out.push_str("{{");
                    out.push_str(&after[..end]);
                    out.push_str("}}");
                }
            }
            rest = &after[end + 2..];
        } else {
            out.push_str(&rest[start..]);
            return out;
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_truncate() {
        assert_eq!(safe_truncate("hello", 10), "hello");
        assert_eq!(safe_truncate("hello", 3), "hel");
        assert_eq!(safe_truncate("héllo", 2), "hé");
    }

    #[test]
    fn test_safe_truncate_counts_chars_not_bytes() {
        let s = "日本語のテキスト";
        assert_eq!(safe_truncate(s, 3), "日本語");
        assert_eq!(safe_truncate(s, 8), s);
        assert_eq!(safe_truncate(s, 100), s);
    }

    #[test]
    fn test_run_signals() {
        let signals = RunSignals::new();
        assert!(!signals.is_complete());
        signals.complete("done the thing");
        assert!(signals.is_complete());
        assert_eq!(signals.summary().as_deref(), Some("done the thing"));
    }

    #[test]
    fn test_resolve_secret_placeholders() {
        let mut config = Config::default();
        config.secrets.insert("LOGIN_PASSWORD".into(), "hunter2".into());

        let resolved = resolve_secret_placeholders("pw: {{LOGIN_PASSWORD}}", &config);
        assert_eq!(resolved, "pw: hunter2");

        // Unknown names stay as-is
        let resolved = resolve_secret_placeholders("{{MISSING}} end", &config);
        assert_eq!(resolved, "{{MISSING}} end");

        // Unterminated placeholder passes through
        let resolved = resolve_secret_placeholders("broken {{LOGIN", &config);
        assert_eq!(resolved, "broken {{LOGIN");
    }
}
