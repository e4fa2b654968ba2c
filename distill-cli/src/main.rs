use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "distill", about = "Summarize web pages with a local language model")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a page: summarize it and extract structured data
    Capture(commands::capture::CaptureArgs),
    /// Manage configuration
    Config(commands::config::ConfigArgs),
    /// Show model availability
    Status(commands::status::StatusArgs),
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
        Commands::Capture(args) => commands::capture::run(args).await,
        Commands::Config(args) => commands::config::run(args),
        Commands::Status(args) => commands::status::run(args).await,
    }
}
