mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "webpilot")]
#[command(about = "A natural-language browser automation agent", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Carry out a natural-language instruction in a live browser
    Run {
        /// What to do, e.g. "find the cheapest flight to Lisbon on example.com"
        instruction: String,

        /// Use the Playwright MCP toolset instead of the built-in one
        #[arg(long)]
        mcp: bool,

        /// Run the browser without a visible window
        #[arg(long)]
        headless: bool,

        /// Maximum number of decision rounds before the run stops
        #[arg(long)]
        max_iterations: Option<u32>,
    },

    /// Inspect the tool catalog
    Tools {
        #[command(subcommand)]
        command: ToolsCommands,
    },

    /// Show current configuration status
    Status,
}

#[derive(Subcommand)]
enum ToolsCommands {
    /// List the tools a run would advertise to the model
    List {
        /// Show the Playwright MCP catalog (spawns the server)
        #[arg(long)]
        mcp: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Run {
            instruction,
            mcp,
            headless,
            max_iterations,
        } => {
            commands::run_cmd::run(instruction, mcp, headless, max_iterations).await?;
        }
        Commands::Tools { command } => match command {
            ToolsCommands::List { mcp } => {
                commands::tools_cmd::list(mcp).await?;
            }
        },
        Commands::Status => {
            commands::status::run().await?;
        }
    }

    Ok(())
}
