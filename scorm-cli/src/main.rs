use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "scorm-rte", about = "SCORM 1.2 / 2004 run-time environment")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive a scripted SCO session against the attempt database
    Run(commands::run::RunArgs),
    /// Show stored attempts for a learner and package
    Attempt(commands::attempt::AttemptArgs),
    /// Inspect or drain the replay queue of unsynced progress
    Replay(commands::replay::ReplayArgs),
    /// Manage configuration
    Config(commands::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => commands::run::run(args).await,
        Commands::Attempt(args) => commands::attempt::run(args).await,
        Commands::Replay(args) => commands::replay::run(args).await,
        Commands::Config(args) => commands::config::run(args),
    }
}
