use webpilot_core::{Config, Paths};
use webpilot_tools::browser::session::find_browser_binary;

pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();

    println!("webpilot status");
    println!("===============");
    println!();

    let config_path = paths.config_file();
    let config_exists = config_path.exists();
    println!(
        "Config:    {} {}",
        config_path.display(),
        if config_exists { "✓" } else { "✗ (not found, using defaults)" }
    );

    let workspace_path = paths.workspace();
    println!(
        "Workspace: {} {}",
        workspace_path.display(),
        if workspace_path.exists() { "✓" } else { "✗ (created on first run)" }
    );

    let config = Config::load_or_default(&paths)?;
    println!();
    println!("Provider:  {}", config.provider);
    let model = match config.provider.as_str() {
        "openai" => config.openai.model_id.clone(),
        "azure" => config.azure.deployment_name.clone(),
        _ => config.ollama.model_id.clone(),
    };
    println!("Model:     {}", model);
    match config.validate_provider() {
        Ok(()) => println!("Creds:     ✓"),
        Err(e) => println!("Creds:     ✗ {}", e),
    }

    println!();
    println!("Mode:      {}", if config.use_mcp { "mcp" } else { "basic" });
    println!("Headless:  {}", config.headless);

    println!();
    match find_browser_binary() {
        Ok(path) => println!("Browser:   {} ✓", path.display()),
        Err(_) => println!("Browser:   ✗ no Chrome/Chromium found"),
    }
    match which::which("npx") {
        Ok(path) => println!("npx:       {} ✓", path.display()),
        Err(_) => println!("npx:       ✗ not found (needed for --mcp)"),
    }

    Ok(())
}
