//! Codepilot CLI
//!
//! Main entry point for the codepilot command-line tool.
//! Analyzes a project into a persisted context and answers questions about it.

mod commands;

use clap::{Parser, Subcommand};
use codepilot_core::{config::AppConfig, logging, AppResult};
use commands::{
    AnalyzeCommand, AskCommand, HistoryCommand, StatsCommand, TemplatesCommand, UpdateCommand,
};
use std::path::PathBuf;

/// Codepilot - ask questions about a codebase with retrieval-augmented context
#[derive(Parser, Debug)]
#[command(name = "codepilot")]
#[command(about = "Ask questions about a codebase with retrieval-augmented context", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "CODEPILOT_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "CODEPILOT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// LLM provider (ollama, gemini, mock)
    #[arg(short, long, global = true, env = "CODEPILOT_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "CODEPILOT_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a local directory or GitHub repository into the project context
    Analyze(AnalyzeCommand),

    /// Ask a question about the analyzed project
    Ask(AskCommand),

    /// Re-analyze files changed in the git working tree
    Update(UpdateCommand),

    /// Show project context statistics
    Stats(StatsCommand),

    /// Manage instruction templates
    Templates(TemplatesCommand),

    /// Inspect the chat history
    History(HistoryCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load base configuration from environment and config file
    let config = AppConfig::load()?;

    // Apply CLI overrides
    let config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    config.ensure_state_dir()?;

    // Initialize logging with final configuration
    let log_file = config.log_file();
    logging::init_logging(config.log_level.as_deref(), config.no_color, Some(&log_file))?;

    tracing::info!("Codepilot CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    let command_name = match &cli.command {
        Commands::Analyze(_) => "analyze",
        Commands::Ask(_) => "ask",
        Commands::Update(_) => "update",
        Commands::Stats(_) => "stats",
        Commands::Templates(_) => "templates",
        Commands::History(_) => "history",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    // Route to command handlers
    let result = match cli.command {
        Commands::Analyze(cmd) => cmd.execute(&config).await,
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Update(cmd) => cmd.execute(&config).await,
        Commands::Stats(cmd) => cmd.execute(&config),
        Commands::Templates(cmd) => cmd.execute(&config),
        Commands::History(cmd) => cmd.execute(&config),
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
