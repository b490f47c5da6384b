//! Walk-forward backtest command.
//!
//! Loads an event history, replays it through the chosen predictor, and
//! writes the prediction log, ledger, and reports to the output directory.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::Args;

use walkline_backtest::{
    format_text_report, resolve_seed, write_artifacts, BacktestRunner, MarketLineSimulator,
    MeanPredictor, ObservedQuotes, Predictor, RidgeRegressor, RunReport, RunResults,
};
use walkline_core::RunConfig;
use walkline_data::EventHistoryStore;

use super::{load_config, OutputFormat};

/// Arguments for the run command.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Event history CSV file
    #[arg(long)]
    pub data: PathBuf,

    /// Config file path (defaults to walkline.toml plus WALKLINE_* env vars)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for predictions.csv, ledger.csv, and reports
    #[arg(long, default_value = "walkline-out")]
    pub out: PathBuf,

    /// Seed for the market line simulator (overrides market.seed)
    #[arg(long, env = "WALKLINE_SEED")]
    pub seed: Option<u64>,

    /// Observed market lines CSV; events without a line are simulated
    #[arg(long)]
    pub quotes: Option<PathBuf>,

    /// Output format: text, json (default: text)
    #[arg(long, default_value = "text")]
    pub format: String,

    /// Predictor: ridge, mean (default: ridge)
    #[arg(long, default_value = "ridge")]
    pub predictor: String,

    /// Ridge penalty
    #[arg(long, default_value = "1.0")]
    pub lambda: f64,
}

/// Predictor selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictorKind {
    Ridge,
    Mean,
}

impl PredictorKind {
    /// Parses a predictor name from string.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ridge" | "linear" => Ok(PredictorKind::Ridge),
            "mean" | "baseline" => Ok(PredictorKind::Mean),
            _ => Err(anyhow!(
                "Unknown predictor: '{}'. Valid predictors: ridge, mean",
                s
            )),
        }
    }
}

/// Runs the backtest command.
pub fn run_backtest(args: RunArgs) -> Result<()> {
    let format = OutputFormat::parse(&args.format)?;
    let kind = PredictorKind::parse(&args.predictor)?;
    if !(args.lambda >= 0.0 && args.lambda.is_finite()) {
        return Err(anyhow!("Invalid ridge penalty: {}", args.lambda));
    }

    let mut config = load_config(args.config.as_deref())?;
    config.market.seed = Some(resolve_seed(args.seed.or(config.market.seed)));

    let store = EventHistoryStore::load(&args.data, &config.data, &config.outcome_names())
        .with_context(|| format!("Failed to load event history: {}", args.data.display()))?;

    let results = match kind {
        PredictorKind::Ridge => execute(
            config,
            RidgeRegressor::new(args.lambda),
            &store,
            args.quotes.as_deref(),
        )?,
        PredictorKind::Mean => {
            execute(config, MeanPredictor::new(), &store, args.quotes.as_deref())?
        }
    };

    tracing::info!(
        bets = results.ledger.len(),
        final_bankroll = %results.ledger.final_bankroll(),
        "Backtest complete"
    );

    let paths = write_artifacts(&results, &args.out)?;
    let report = RunReport::from_results(&results);
    match format {
        OutputFormat::Text => println!("{}", format_text_report(&report)),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }
    tracing::info!(
        ledger = %paths.ledger.display(),
        predictions = %paths.predictions.display(),
        "Artifacts written"
    );

    Ok(())
}

fn execute<P: Predictor>(
    config: RunConfig,
    predictor: P,
    store: &EventHistoryStore,
    quotes: Option<&Path>,
) -> Result<RunResults> {
    let runner = BacktestRunner::new(config.clone(), predictor);
    let results = match quotes {
        Some(path) => {
            let fallback = MarketLineSimulator::new(&config.market.dimensions, config.market.seed)?;
            let mut observed = ObservedQuotes::load_csv(
                path,
                &config.data.id_column,
                &config.outcome_names(),
                fallback,
            )?;
            tracing::info!(quotes = observed.len(), "Using observed market lines");
            runner.run_with_quotes(store, &mut observed)?
        }
        None => runner.run(store)?,
    };
    Ok(results)
}
