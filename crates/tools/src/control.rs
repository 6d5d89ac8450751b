use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;
use webpilot_core::{Error, Result};

use crate::{Tool, ToolContext, ToolSchema};

/// Explicit completion signal. The model calls this with a final summary;
/// the loop stops after the current tool batch.
pub struct TaskCompleteTool;

#[async_trait]
impl Tool for TaskCompleteTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "task_complete",
            description: "Mark the task as complete. Call this exactly once, when the user's instruction has been fully carried out, with a short summary of what was done and any result the user asked for.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "summary": {
                        "type": "string",
                        "description": "What was accomplished, including any extracted answer"
                    }
                },
                "required": ["summary"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        if params.get("summary").and_then(|v| v.as_str()).is_none() {
            return Err(Error::Validation("task_complete requires 'summary'".into()));
        }
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let summary = params["summary"].as_str().unwrap_or_default();
        info!(summary = %summary, "Task marked complete");
        ctx.signals.complete(summary);
        Ok(json!({"status": "complete"}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use webpilot_core::Config;

    #[tokio::test]
    async fn test_task_complete_raises_signal() {
        let ctx = ToolContext::new(PathBuf::from("/tmp"), Config::default());
        let signals = ctx.signals.clone();
        let tool = TaskCompleteTool;

        tool.execute(ctx, json!({"summary": "ordered the book"}))
            .await
            .unwrap();
        assert!(signals.is_complete());
        assert_eq!(signals.summary().as_deref(), Some("ordered the book"));
    }

    #[test]
    fn test_validate_requires_summary() {
        let tool = TaskCompleteTool;
        assert!(tool.validate(&json!({})).is_err());
        assert!(tool.validate(&json!({"summary": "ok"})).is_ok());
    }
}
