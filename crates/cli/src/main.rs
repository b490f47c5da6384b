use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

use commands::{AnalyzeArgs, RunArgs};

#[derive(Parser)]
#[command(name = "walkline")]
#[command(about = "Walk-forward backtests for point-spread and total betting models", long_about = None)]
struct Cli {
    /// Optional log file path (logs to file instead of stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a walk-forward backtest over an event history
    Run(RunArgs),
    /// Re-analyze a stored bankroll ledger
    Analyze(AnalyzeArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match &cli.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    match cli.command {
        Commands::Run(args) => commands::run_backtest(args)?,
        Commands::Analyze(args) => commands::run_analyze(args)?,
    }

    Ok(())
}
