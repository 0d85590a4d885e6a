//! Course tutor CLI
//!
//! Main entry point for the tutor command-line tool.
//! Answers questions from course materials and manages operator settings.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, SettingsCommand};
use std::path::PathBuf;
use tutor_core::{config::AppConfig, logging, AppResult};
use tutor_llm::DEFAULT_PROVIDER;

/// Course tutor - grounded answers from course materials
#[derive(Parser, Debug)]
#[command(name = "tutor")]
#[command(about = "Grounded answers from course materials", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "TUTOR_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "TUTOR_CONFIG")]
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

    /// Generation provider
    #[arg(short, long, global = true, env = "TUTOR_PROVIDER", default_value = DEFAULT_PROVIDER)]
    provider: String,

    /// Retrieval model identifier
    #[arg(short, long, global = true, env = "TUTOR_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask a question about the course materials
    Ask(AskCommand),

    /// Manage persisted settings
    Settings(SettingsCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let config = AppConfig::load()?.with_overrides(
        cli.workspace,
        cli.config,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("Course tutor CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", cli.provider);

    config.ensure_tutor_dir()?;

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Settings(_) => "settings",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(&config, &cli.provider).await,
        Commands::Settings(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
