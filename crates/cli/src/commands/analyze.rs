//! Re-analysis of a stored bankroll ledger.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use walkline_backtest::{format_text_report, BankrollLedger, PerformanceAnalyzer, RunReport};

use super::{load_config, OutputFormat};

/// Arguments for the analyze command.
#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Ledger CSV written by `walkline run`
    #[arg(long)]
    pub ledger: PathBuf,

    /// Config file path (analysis settings and starting bankroll)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format: text, json (default: text)
    #[arg(long, default_value = "text")]
    pub format: String,
}

/// Runs the analyze command.
pub fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let format = OutputFormat::parse(&args.format)?;
    let config = load_config(args.config.as_deref())?;

    let ledger = BankrollLedger::read_csv(&args.ledger, config.staking.starting_bankroll)?;
    tracing::info!(
        entries = ledger.len(),
        path = %args.ledger.display(),
        "Ledger loaded"
    );

    let performance = PerformanceAnalyzer::new(&config.analysis)?.analyze(&ledger);
    let report = RunReport::ledger_only(config, performance);
    match format {
        OutputFormat::Text => println!("{}", format_text_report(&report)),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_analyze_rejects_broken_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "sequence,event_id,timestamp,bet_type,side,prediction,line,realized,edge,\
             win_probability,confidence,stake,outcome,profit,bankroll_before,bankroll_after"
        )
        .unwrap();
        writeln!(
            file,
            "1,g1,2024-01-05T00:00:00Z,margin,home,5,2,6,3,0.53,0.3,32.5,WIN,29.55,10000,10029.55"
        )
        .unwrap();
        writeln!(
            file,
            "2,g2,2024-01-06T00:00:00Z,margin,away,-4,-1,2,3,0.53,0.3,30,LOSS,-30,10000,9970"
        )
        .unwrap();
        drop(file);

        let config = dir.path().join("walkline.toml");
        std::fs::write(&config, "").unwrap();
        let args = AnalyzeArgs {
            ledger: path,
            config: Some(config),
            format: "text".to_string(),
        };
        let err = run_analyze(args).unwrap_err();
        assert!(err.to_string().contains("integrity"));
    }

    #[test]
    fn test_analyze_empty_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.csv");
        std::fs::write(&path, "").unwrap();
        let config = dir.path().join("walkline.toml");
        std::fs::write(&config, "[staking]\nstarting_bankroll = \"5000\"\n").unwrap();

        let args = AnalyzeArgs {
            ledger: path,
            config: Some(config),
            format: "json".to_string(),
        };
        run_analyze(args).unwrap();
    }
}
