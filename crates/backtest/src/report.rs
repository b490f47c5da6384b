//! Report documents and run artifacts.
//!
//! A report always embeds the run configuration so it can be reproduced.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;
use walkline_core::RunConfig;
use walkline_data::CsvStorage;

use crate::accuracy::DimensionAccuracy;
use crate::analyzer::{GroupBreakdown, PerformanceReport};
use crate::pipeline::{RunResults, RunSummary};
use crate::staking::StakingSummary;

/// Structured, self-describing report for one run or one re-analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub config: RunConfig,
    /// Absent when re-analyzing a stored ledger.
    pub run: Option<RunSummary>,
    pub staking: Option<StakingSummary>,
    pub accuracy: Vec<DimensionAccuracy>,
    pub performance: PerformanceReport,
}

impl RunReport {
    #[must_use]
    pub fn from_results(results: &RunResults) -> Self {
        Self {
            config: results.config.clone(),
            run: Some(results.summary.clone()),
            staking: Some(results.staking.clone()),
            accuracy: results.accuracy.clone(),
            performance: results.performance.clone(),
        }
    }

    /// Report over a ledger analyzed on its own.
    #[must_use]
    pub fn ledger_only(config: RunConfig, performance: PerformanceReport) -> Self {
        Self {
            config,
            run: None,
            staking: None,
            accuracy: Vec::new(),
            performance,
        }
    }

    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize report")
    }
}

/// Paths written by [`write_artifacts`].
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub predictions: PathBuf,
    pub ledger: PathBuf,
    pub report_json: PathBuf,
    pub report_text: PathBuf,
}

/// Writes the prediction log, ledger, and both report formats into `dir`.
///
/// # Errors
/// Returns error if the directory or any file cannot be written.
pub fn write_artifacts(results: &RunResults, dir: &Path) -> Result<ArtifactPaths> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

    let paths = ArtifactPaths {
        predictions: dir.join("predictions.csv"),
        ledger: dir.join("ledger.csv"),
        report_json: dir.join("report.json"),
        report_text: dir.join("report.txt"),
    };

    CsvStorage::write_rows(&paths.predictions, &results.log)?;
    results.ledger.write_csv(&paths.ledger)?;

    let report = RunReport::from_results(results);
    fs::write(&paths.report_json, report.to_json()?)
        .with_context(|| format!("Failed to write {}", paths.report_json.display()))?;
    fs::write(&paths.report_text, format_text_report(&report))
        .with_context(|| format!("Failed to write {}", paths.report_text.display()))?;

    info!(dir = %dir.display(), "report written");
    Ok(paths)
}

const RULE: &str = "===============================================================\n";
const THIN_RULE: &str = "---------------------------------------------------------------\n";

fn section(output: &mut String, title: &str) {
    output.push_str(title);
    output.push('\n');
    output.push_str(THIN_RULE);
}

/// Formats a report as human-readable text.
#[must_use]
pub fn format_text_report(report: &RunReport) -> String {
    let perf = &report.performance;
    let basic = &perf.basic;
    let risk = &perf.risk;
    let config = &report.config;

    let mut output = String::new();

    // Header
    output.push('\n');
    output.push_str(RULE);
    output.push_str("                 WALK-FORWARD BACKTEST RESULTS                 \n");
    output.push_str(RULE);

    if let Some(run) = &report.run {
        if let (Some(first), Some(last)) = (run.first_prediction, run.last_prediction) {
            let _ = writeln!(
                output,
                "Period:         {} to {}",
                first.format("%Y-%m-%d"),
                last.format("%Y-%m-%d")
            );
        }
        let _ = writeln!(output, "Predictor:      {}", run.predictor);
        let _ = writeln!(
            output,
            "Predictions:    {} of {} events",
            run.predictions, run.events
        );
        let _ = writeln!(
            output,
            "Retrains:       {} ({} failed, {} stale predictions)",
            run.retrains, run.fit_failures, run.stale_predictions
        );
    }
    let _ = writeln!(
        output,
        "Train Window:   {} (retrain every {})",
        config.walk_forward.train_window, config.walk_forward.retrain_every
    );
    let _ = writeln!(output, "Min Edge:       {:.2}", config.staking.min_edge);
    let _ = writeln!(
        output,
        "Kelly:          {} (cap {}% of bankroll)",
        config.staking.kelly_multiplier,
        config.staking.stake_cap_fraction * rust_decimal::Decimal::ONE_HUNDRED
    );
    output.push('\n');

    section(&mut output, "CORE METRICS");
    let _ = writeln!(output, "Total Bets:     {}", basic.total_bets);
    let _ = writeln!(output, "Wins:           {}", basic.wins);
    let _ = writeln!(output, "Losses:         {}", basic.losses);
    if basic.pushes > 0 {
        let _ = writeln!(output, "Pushes:         {}", basic.pushes);
    }
    let _ = writeln!(output, "Win Rate:       {:.1}%", basic.win_rate * 100.0);
    let _ = writeln!(
        output,
        "Wilson 95% CI:  [{:.1}%, {:.1}%]",
        perf.significance.wilson_ci_lower * 100.0,
        perf.significance.wilson_ci_upper * 100.0
    );
    let sig_label = if perf.significance.is_significant {
        "SIGNIFICANT"
    } else {
        "NOT SIGNIFICANT"
    };
    let _ = writeln!(
        output,
        "Binomial p:     {:.4} ({} vs {:.1}% break-even)",
        perf.significance.p_value,
        sig_label,
        basic.break_even_rate * 100.0
    );
    output.push('\n');

    section(&mut output, "FINANCIAL METRICS");
    let _ = writeln!(output, "Starting:       ${:.2}", basic.starting_bankroll);
    let _ = writeln!(output, "Final:          ${:.2}", basic.final_bankroll);
    let _ = writeln!(output, "Total Wagered:  ${:.2}", basic.total_wagered);
    let _ = writeln!(output, "Net P&L:        ${:.2}", basic.total_profit);
    let _ = writeln!(output, "Average Stake:  ${:.2}", basic.average_stake);
    let _ = writeln!(output, "ROI:            {:.1}%", basic.roi * 100.0);
    output.push('\n');

    section(&mut output, "RISK METRICS");
    let _ = writeln!(output, "Sharpe:         {}", risk.sharpe);
    let _ = writeln!(output, "Sortino:        {}", risk.sortino);
    let _ = writeln!(output, "Calmar:         {}", risk.calmar);
    let _ = writeln!(
        output,
        "Max Drawdown:   ${:.2} ({:.1}%)",
        risk.max_drawdown,
        risk.max_drawdown_pct * 100.0
    );
    let _ = writeln!(output, "Total Return:   {:.1}%", risk.cumulative_return * 100.0);
    output.push('\n');

    section(&mut output, "STREAKS");
    let s = &perf.streaks;
    let _ = writeln!(
        output,
        "Longest Win:    {} (avg {:.1})",
        s.longest_win, s.average_win
    );
    let _ = writeln!(
        output,
        "Longest Loss:   {} (avg {:.1})",
        s.longest_loss, s.average_loss
    );
    output.push('\n');

    section(&mut output, "EDGE THRESHOLDS");
    output.push_str("  Edge >   Bets   Win Rate        ROI\n");
    for row in &perf.edge_thresholds {
        let _ = writeln!(
            output,
            "  {:>6.1} {:>6} {:>9.1}% {:>9.1}%",
            row.threshold,
            row.bets,
            row.win_rate * 100.0,
            row.roi * 100.0
        );
    }
    output.push('\n');

    section(&mut output, "KELLY ESTIMATE");
    let k = &perf.kelly;
    let _ = writeln!(output, "Historical WR:  {:.1}%", k.win_rate * 100.0);
    let _ = writeln!(output, "Full Kelly:     {:.2}%", k.full_kelly * 100.0);
    let _ = writeln!(output, "Quarter Kelly:  {:.2}%", k.quarter_kelly * 100.0);
    let _ = writeln!(output, "Recommended:    {:.2}%", k.recommended * 100.0);
    output.push('\n');

    if !perf.by_bet_type.is_empty() {
        section(&mut output, "BY BET TYPE");
        push_groups(&mut output, &perf.by_bet_type);
        output.push('\n');
    }
    if !perf.monthly.is_empty() {
        section(&mut output, "BY MONTH");
        push_groups(&mut output, &perf.monthly);
        output.push('\n');
    }

    if !report.accuracy.is_empty() {
        section(&mut output, "PREDICTION ACCURACY");
        for a in &report.accuracy {
            let _ = writeln!(
                output,
                "{:<10} MAE {:.2}  RMSE {:.2}  r {:.3}  beat market {:.1}% (market MAE {:.2})",
                a.dimension,
                a.mae,
                a.rmse,
                a.correlation,
                a.beat_market_rate * 100.0,
                a.market_mae
            );
            if let Some(dir) = a.direction_accuracy {
                let _ = writeln!(output, "{:<10} direction {:.1}%", "", dir * 100.0);
            }
        }
        output.push('\n');
    }

    output.push_str(RULE);
    output
}

fn push_groups(output: &mut String, groups: &[GroupBreakdown]) {
    output.push_str("  Group        Bets   W-L-P       Win Rate         P&L       ROI\n");
    for g in groups {
        let record = format!("{}-{}-{}", g.wins, g.losses, g.pushes);
        let _ = writeln!(
            output,
            "  {:<10} {:>6}   {:<10} {:>7.1}% {:>11.2} {:>8.1}%",
            g.key,
            g.bets,
            record,
            g.win_rate * 100.0,
            g.profit,
            g.roi * 100.0
        );
    }
}
