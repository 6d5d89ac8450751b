use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};
use webpilot_core::{Error, Result};

use crate::browser::basic::{
    ClickElementTool, FillInputTool, GetPageContentTool, GetPageStateTool, NavigateToUrlTool,
    PressKeyTool, TypeTextTool, WaitForNavigationTool,
};
use crate::control::TaskCompleteTool;
use crate::{Tool, ToolContext};

/// Fixed catalog of tools for a run. Built once at startup; the loop only
/// ever reads from it.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Registration order, so advertised schemas are stable across runs.
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// The built-in browser toolset driven over the DevTools protocol.
    pub fn basic() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(NavigateToUrlTool));
        registry.register(Arc::new(GetPageStateTool));
        registry.register(Arc::new(GetPageContentTool));
        registry.register(Arc::new(ClickElementTool));
        registry.register(Arc::new(FillInputTool));
        registry.register(Arc::new(TypeTextTool));
        registry.register(Arc::new(PressKeyTool));
        registry.register(Arc::new(WaitForNavigationTool));
        registry.register(Arc::new(TaskCompleteTool));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        debug!(name = schema.name, "Registering tool");
        if !self.tools.contains_key(schema.name) {
            self.order.push(schema.name.to_string());
        }
        self.tools.insert(schema.name.to_string(), tool);
    }

    /// Register all tools exposed by an MCP server provider. Fails when the
    /// server cannot produce its catalog; a run with no browser tools is
    /// useless.
    pub async fn register_mcp_provider(
        &mut self,
        provider: &crate::mcp::provider::McpToolProvider,
    ) -> Result<()> {
        let tools = provider.tools().await?;
        for tool in tools {
            let schema = tool.schema();
            debug!(name = schema.name, "Registering MCP tool");
            self.register(tool);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn get_tool_schemas(&self) -> Vec<Value> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| {
                let schema = tool.schema();
                json!({
                    "type": "function",
                    "function": {
                        "name": schema.name,
                        "description": schema.description,
                        "parameters": schema.parameters
                    }
                })
            })
            .collect()
    }

    /// Registered tool names in registration order.
    pub fn tool_names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub async fn execute(&self, name: &str, ctx: ToolContext, params: Value) -> Result<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| Error::Tool(format!("Unknown tool: {}", name)))?;

        if let Err(e) = tool.validate(&params) {
            warn!(tool = name, error = %e, "Tool validation failed");
            return Err(e);
        }

        debug!(tool = name, "Executing tool");
        tool.execute(ctx, params).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::basic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_new_empty() {
        let reg = ToolRegistry::new();
        assert!(reg.tool_names().is_empty());
        assert!(reg.get("navigate_to_url").is_none());
    }

    #[test]
    fn test_basic_registry_catalog() {
        let reg = ToolRegistry::basic();
        let names = reg.tool_names();
        assert_eq!(
            names,
            vec![
                "navigate_to_url",
                "get_page_state",
                "get_page_content",
                "click_element",
                "fill_input",
                "type_text",
                "press_key",
                "wait_for_navigation",
                "task_complete",
            ]
        );
    }

    #[test]
    fn test_lookup_total_over_tool_names() {
        let reg = ToolRegistry::basic();
        for name in reg.tool_names() {
            assert!(reg.get(&name).is_some(), "missing tool: {}", name);
        }
    }

    #[test]
    fn test_get_tool_schemas_shape_and_order() {
        let reg = ToolRegistry::basic();
        let schemas = reg.get_tool_schemas();
        assert_eq!(schemas.len(), reg.tool_names().len());
        for schema in &schemas {
            assert_eq!(schema["type"], "function");
            assert!(schema["function"]["name"].is_string());
            assert!(schema["function"]["description"].is_string());
        }
        assert_eq!(schemas[0]["function"]["name"], "navigate_to_url");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_tool_error() {
        let reg = ToolRegistry::basic();
        let ctx = ToolContext::new(std::path::PathBuf::from("/tmp"), webpilot_core::Config::default());
        let err = reg.execute("teleport", ctx, serde_json::json!({})).await.unwrap_err();
        match err {
            Error::Tool(msg) => assert!(msg.contains("Unknown tool: teleport")),
            other => panic!("expected Tool error, got {:?}", other),
        }
    }
}
