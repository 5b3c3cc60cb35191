//! Stepwise CLI — the main entry point.
//!
//! Commands:
//! - `run`     — Drive the orchestrator on one task
//! - `tools`   — Start every configured provider and list its tools
//! - `config`  — Print the effective or default configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "stepwise",
    about = "Stepwise — step-by-step tool orchestration for language models",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the orchestrator on a task
    Run {
        /// The task to solve
        task: String,

        /// Read configuration from this file instead of ~/.stepwise/config.toml
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the step budget
        #[arg(long)]
        max_rounds: Option<usize>,

        /// Override the model
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Start every configured provider and list the tools it exposes
    Tools {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the configuration
    Config {
        /// Print a starter config instead of the effective one
        #[arg(long)]
        default: bool,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            task,
            config,
            max_rounds,
            model,
        } => commands::run::run(&task, config, max_rounds, model).await?,
        Commands::Tools { config } => commands::tools::run(config).await?,
        Commands::Config { default, config } => commands::config_cmd::show(default, config)?,
    }

    Ok(())
}
