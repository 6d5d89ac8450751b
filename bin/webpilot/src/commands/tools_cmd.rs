use std::sync::Arc;

use webpilot_core::{Config, Paths};
use webpilot_tools::control::TaskCompleteTool;
use webpilot_tools::mcp::McpToolProvider;
use webpilot_tools::ToolRegistry;

pub async fn list(mcp: bool) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;

    let registry = if mcp {
        let provider = McpToolProvider::start_playwright(&config).await?;
        let mut registry = ToolRegistry::new();
        let listed = registry.register_mcp_provider(&provider).await;
        provider.shutdown().await;
        listed?;
        registry.register(Arc::new(TaskCompleteTool));
        registry
    } else {
        ToolRegistry::basic()
    };

    let schemas = registry.get_tool_schemas();
    println!(
        "{} toolset ({} tools):",
        if mcp { "enhanced" } else { "basic" },
        schemas.len()
    );
    println!();
    for schema in schemas {
        let name = schema["function"]["name"].as_str().unwrap_or("?");
        let description = schema["function"]["description"].as_str().unwrap_or("");
        // First sentence is enough for a listing
        let short = description.split(". ").next().unwrap_or(description);
        println!("  {:<24} {}", name, short);
    }

    Ok(())
}
