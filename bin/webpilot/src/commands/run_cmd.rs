use std::sync::Arc;

use tracing::info;
use webpilot_agent::AgentRunner;
use webpilot_core::{Config, Paths};
use webpilot_providers::create_provider;
use webpilot_tools::browser::session::BrowserSession;
use webpilot_tools::control::TaskCompleteTool;
use webpilot_tools::mcp::McpToolProvider;
use webpilot_tools::{ToolContext, ToolRegistry};

pub async fn run(
    instruction: String,
    mcp: bool,
    headless: bool,
    max_iterations: Option<u32>,
) -> anyhow::Result<()> {
    let paths = Paths::new();
    paths.ensure_dirs()?;

    let mut config = Config::load_or_default(&paths)?;
    // CLI flags win over config file and environment
    if mcp {
        config.use_mcp = true;
    }
    if headless {
        config.headless = true;
    }
    if let Some(n) = max_iterations {
        config.agent.max_iterations = n;
    }
    config.validate_provider()?;

    let provider = create_provider(&config)?;
    let use_mcp = config.use_mcp;
    let mut ctx = ToolContext::new(paths.workspace(), config.clone());

    let outcome = if use_mcp {
        let mcp_provider = McpToolProvider::start_playwright(&config).await?;

        let mut registry = ToolRegistry::new();
        if let Err(e) = registry.register_mcp_provider(&mcp_provider).await {
            mcp_provider.shutdown().await;
            return Err(e.into());
        }
        registry.register(Arc::new(TaskCompleteTool));

        let runner = AgentRunner::new(provider, registry, ctx, true);
        let result = runner.run(&instruction).await;

        // The server dies with us either way, but don't leave it to Drop
        mcp_provider.shutdown().await;
        result?
    } else {
        let session =
            BrowserSession::launch(&paths.browser_profile_dir(), config.headless).await?;
        let handle = Arc::new(tokio::sync::Mutex::new(session));
        ctx.browser = Some(handle.clone());

        let registry = ToolRegistry::basic();
        let runner = AgentRunner::new(provider, registry, ctx, false);
        let result = runner.run(&instruction).await;

        handle.lock().await.close().await;
        result?
    };

    info!(iterations = outcome.iterations, "Run finished");
    println!();
    if outcome.completed {
        println!("{}", outcome.summary);
    } else {
        println!(
            "Stopped after {} iterations without an explicit completion.",
            outcome.iterations
        );
        println!("{}", outcome.summary);
    }

    Ok(())
}
