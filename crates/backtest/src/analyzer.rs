//! Performance analysis over a completed bankroll ledger.
//!
//! Everything here is a pure function of the ledger entries and the analysis
//! settings: analyzing the same ledger twice yields identical reports.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use walkline_core::{
    break_even_probability, full_kelly, AnalysisSettings, BacktestError, WinRateSignificance,
};

use crate::ledger::{decimal_to_f64, BankrollEntry, BankrollLedger};
use crate::outcome::BetOutcome;

/// A ratio that may be undefined (zero denominator, too few bets).
///
/// Serialized as `{"finite": x}` or `"undefined"`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioValue {
    Finite(f64),
    Undefined,
}

impl RatioValue {
    /// `numerator / denominator`, or `Undefined` when the denominator is zero
    /// or the result is not finite.
    #[must_use]
    pub fn ratio(numerator: f64, denominator: f64) -> Self {
        if denominator.abs() < f64::EPSILON {
            return Self::Undefined;
        }
        let value = numerator / denominator;
        if value.is_finite() {
            Self::Finite(value)
        } else {
            Self::Undefined
        }
    }

    #[must_use]
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Finite(v) => Some(v),
            Self::Undefined => None,
        }
    }

    #[must_use]
    pub fn is_undefined(self) -> bool {
        matches!(self, Self::Undefined)
    }
}

impl std::fmt::Display for RatioValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Finite(v) => write!(f, "{v:.3}"),
            Self::Undefined => f.write_str("undefined"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicMetrics {
    pub total_bets: usize,
    pub wins: usize,
    pub losses: usize,
    pub pushes: usize,
    /// wins / (wins + losses); pushes excluded.
    pub win_rate: f64,
    pub break_even_rate: f64,
    pub total_wagered: Decimal,
    pub total_profit: Decimal,
    /// total_profit / total_wagered.
    pub roi: f64,
    pub average_stake: Decimal,
    pub starting_bankroll: Decimal,
    pub final_bankroll: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub sharpe: RatioValue,
    pub sortino: RatioValue,
    pub calmar: RatioValue,
    /// (final − start) / start.
    pub cumulative_return: f64,
    /// Largest peak-to-trough decline in currency.
    pub max_drawdown: Decimal,
    /// Largest peak-to-trough decline as a fraction of the peak.
    pub max_drawdown_pct: f64,
    pub mean_return: f64,
    pub return_std: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreakStats {
    pub longest_win: usize,
    pub longest_loss: usize,
    pub average_win: f64,
    pub average_loss: f64,
    /// Outcome and length of the run still open at the end of the ledger.
    pub current: Option<(BetOutcome, usize)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdResult {
    pub threshold: f64,
    pub bets: usize,
    pub wins: usize,
    pub win_rate: f64,
    pub profit: Decimal,
    pub roi: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KellyEstimate {
    pub win_rate: f64,
    pub net_odds: f64,
    pub full_kelly: f64,
    pub quarter_kelly: f64,
    /// Quarter Kelly floored at zero.
    pub recommended: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupBreakdown {
    /// Bet type name, or `YYYY-MM` for monthly groups.
    pub key: String,
    pub bets: usize,
    pub wins: usize,
    pub losses: usize,
    pub pushes: usize,
    pub win_rate: f64,
    pub wagered: Decimal,
    pub profit: Decimal,
    pub average_stake: Decimal,
    pub roi: f64,
}

/// Every metric derived from one ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub basic: BasicMetrics,
    pub risk: RiskMetrics,
    pub streaks: StreakStats,
    pub significance: WinRateSignificance,
    pub edge_thresholds: Vec<ThresholdResult>,
    pub kelly: KellyEstimate,
    pub by_bet_type: Vec<GroupBreakdown>,
    pub monthly: Vec<GroupBreakdown>,
}

pub struct PerformanceAnalyzer {
    settings: AnalysisSettings,
    /// Net odds used for break-even and the historical Kelly estimate.
    net_odds: Decimal,
}

impl PerformanceAnalyzer {
    /// Creates an analyzer.
    ///
    /// # Errors
    /// Returns `BacktestError::InvalidConfig` if `assumed_odds` is not a valid
    /// American price.
    pub fn new(settings: &AnalysisSettings) -> Result<Self, BacktestError> {
        let net_odds = settings.assumed_odds.net_odds().ok_or_else(|| {
            BacktestError::InvalidConfig(format!(
                "analysis.assumed_odds {} is not a valid American price",
                settings.assumed_odds.0
            ))
        })?;
        Ok(Self {
            settings: settings.clone(),
            net_odds,
        })
    }

    #[must_use]
    pub fn analyze(&self, ledger: &BankrollLedger) -> PerformanceReport {
        let entries = ledger.entries();
        let basic = self.basic_metrics(ledger);
        let decided = basic.wins + basic.losses;
        PerformanceReport {
            risk: self.risk_metrics(ledger),
            streaks: streaks(entries),
            significance: WinRateSignificance::from_counts(
                basic.wins,
                decided,
                basic.break_even_rate,
            ),
            edge_thresholds: edge_threshold_sweep(entries, &self.settings.edge_thresholds),
            kelly: kelly_estimate(basic.wins, decided, self.net_odds),
            by_bet_type: group_by(entries, |e| e.bet_type.clone()),
            monthly: group_by(entries, |e| e.timestamp.format("%Y-%m").to_string()),
            basic,
        }
    }

    fn basic_metrics(&self, ledger: &BankrollLedger) -> BasicMetrics {
        let entries = ledger.entries();
        let tally = Tally::from_entries(entries.iter());
        BasicMetrics {
            total_bets: entries.len(),
            wins: tally.wins,
            losses: tally.losses,
            pushes: tally.pushes,
            win_rate: tally.win_rate(),
            break_even_rate: decimal_to_f64(break_even_probability(self.net_odds)),
            total_wagered: tally.wagered,
            total_profit: tally.profit,
            roi: tally.roi(),
            average_stake: tally.average_stake(),
            starting_bankroll: ledger.starting_bankroll(),
            final_bankroll: ledger.final_bankroll(),
        }
    }

    fn risk_metrics(&self, ledger: &BankrollLedger) -> RiskMetrics {
        let returns: Vec<f64> = ledger
            .entries()
            .iter()
            .map(BankrollEntry::return_on_stake)
            .collect();
        let risk_free = self.settings.annual_risk_free_rate / self.settings.bets_per_year;

        let mean_return = mean(&returns);
        let return_std = sample_std(&returns);
        let excess = mean_return - risk_free;

        let sharpe = if returns.len() < 2 {
            RatioValue::Undefined
        } else {
            RatioValue::ratio(excess, return_std)
        };
        let sortino = if returns.is_empty() {
            RatioValue::Undefined
        } else {
            RatioValue::ratio(excess, downside_deviation(&returns, 0.0))
        };

        let start = ledger.starting_bankroll();
        let cumulative_return = if start > Decimal::ZERO {
            decimal_to_f64((ledger.final_bankroll() - start) / start)
        } else {
            0.0
        };
        let (max_drawdown, max_drawdown_pct) = max_drawdown(ledger);
        let calmar = RatioValue::ratio(cumulative_return, max_drawdown_pct);

        RiskMetrics {
            sharpe,
            sortino,
            calmar,
            cumulative_return,
            max_drawdown,
            max_drawdown_pct,
            mean_return,
            return_std,
        }
    }
}

#[derive(Debug, Default)]
struct Tally {
    bets: usize,
    wins: usize,
    losses: usize,
    pushes: usize,
    wagered: Decimal,
    profit: Decimal,
}

impl Tally {
    fn from_entries<'a>(entries: impl Iterator<Item = &'a BankrollEntry>) -> Self {
        let mut tally = Self::default();
        for e in entries {
            tally.add(e);
        }
        tally
    }

    fn add(&mut self, e: &BankrollEntry) {
        self.bets += 1;
        match e.outcome {
            BetOutcome::Win => self.wins += 1,
            BetOutcome::Loss => self.losses += 1,
            BetOutcome::Push => self.pushes += 1,
        }
        self.wagered += e.stake;
        self.profit += e.profit;
    }

    fn win_rate(&self) -> f64 {
        let decided = self.wins + self.losses;
        if decided == 0 {
            0.0
        } else {
            self.wins as f64 / decided as f64
        }
    }

    fn roi(&self) -> f64 {
        if self.wagered.is_zero() {
            0.0
        } else {
            decimal_to_f64(self.profit / self.wagered)
        }
    }

    fn average_stake(&self) -> Decimal {
        if self.bets == 0 {
            Decimal::ZERO
        } else {
            (self.wagered / Decimal::from(self.bets)).round_dp(2)
        }
    }

    fn into_breakdown(self, key: String) -> GroupBreakdown {
        GroupBreakdown {
            key,
            bets: self.bets,
            wins: self.wins,
            losses: self.losses,
            pushes: self.pushes,
            win_rate: self.win_rate(),
            wagered: self.wagered,
            profit: self.profit,
            average_stake: self.average_stake(),
            roi: self.roi(),
        }
    }
}

/// Longest and average runs of consecutive wins and losses in one
/// left-to-right scan. Pushes end the current run without starting one.
#[must_use]
pub fn streaks(entries: &[BankrollEntry]) -> StreakStats {
    let mut win_runs: Vec<usize> = Vec::new();
    let mut loss_runs: Vec<usize> = Vec::new();
    let mut current: Option<(BetOutcome, usize)> = None;

    let mut close = |run: Option<(BetOutcome, usize)>| match run {
        Some((BetOutcome::Win, n)) => win_runs.push(n),
        Some((BetOutcome::Loss, n)) => loss_runs.push(n),
        _ => {}
    };

    for e in entries {
        current = match (current, e.outcome) {
            (_, BetOutcome::Push) => {
                close(current);
                None
            }
            (Some((kind, n)), outcome) if kind == outcome => Some((kind, n + 1)),
            (prev, outcome) => {
                close(prev);
                Some((outcome, 1))
            }
        };
    }
    close(current);

    let average = |runs: &[usize]| {
        if runs.is_empty() {
            0.0
        } else {
            runs.iter().sum::<usize>() as f64 / runs.len() as f64
        }
    };

    StreakStats {
        longest_win: win_runs.iter().copied().max().unwrap_or(0),
        longest_loss: loss_runs.iter().copied().max().unwrap_or(0),
        average_win: average(&win_runs),
        average_loss: average(&loss_runs),
        current,
    }
}

/// Win rate and ROI restricted to bets whose edge exceeds each threshold,
/// recomputed from the recorded bets.
#[must_use]
pub fn edge_threshold_sweep(entries: &[BankrollEntry], thresholds: &[f64]) -> Vec<ThresholdResult> {
    thresholds
        .iter()
        .map(|&threshold| {
            let tally = Tally::from_entries(entries.iter().filter(|e| e.edge > threshold));
            ThresholdResult {
                threshold,
                bets: tally.bets,
                wins: tally.wins,
                win_rate: tally.win_rate(),
                profit: tally.profit,
                roi: tally.roi(),
            }
        })
        .collect()
}

/// Historical Kelly fraction from the empirical win rate at fixed net odds.
#[must_use]
pub fn kelly_estimate(wins: usize, decided: usize, net_odds: Decimal) -> KellyEstimate {
    let b = decimal_to_f64(net_odds);
    if decided == 0 {
        return KellyEstimate {
            win_rate: 0.0,
            net_odds: b,
            full_kelly: 0.0,
            quarter_kelly: 0.0,
            recommended: 0.0,
        };
    }
    let win_rate = wins as f64 / decided as f64;
    let full = decimal_to_f64(full_kelly(
        Decimal::from(wins) / Decimal::from(decided),
        net_odds,
    ));
    let quarter = full / 4.0;
    KellyEstimate {
        win_rate,
        net_odds: b,
        full_kelly: full,
        quarter_kelly: quarter,
        recommended: quarter.max(0.0),
    }
}

/// Largest peak-to-trough decline, in currency and as a fraction of the
/// peak. The starting bankroll is the first peak.
#[must_use]
pub fn max_drawdown(ledger: &BankrollLedger) -> (Decimal, f64) {
    let mut peak = ledger.starting_bankroll();
    let mut worst = Decimal::ZERO;
    let mut worst_pct = 0.0;
    for e in ledger.entries() {
        let bankroll = e.bankroll_after;
        if bankroll > peak {
            peak = bankroll;
            continue;
        }
        let drawdown = peak - bankroll;
        if drawdown > worst {
            worst = drawdown;
        }
        if peak > Decimal::ZERO {
            let pct = decimal_to_f64(drawdown / peak);
            if pct > worst_pct {
                worst_pct = pct;
            }
        }
    }
    (worst, worst_pct)
}

fn group_by(entries: &[BankrollEntry], key: impl Fn(&BankrollEntry) -> String) -> Vec<GroupBreakdown> {
    let mut groups: BTreeMap<String, Tally> = BTreeMap::new();
    for e in entries {
        groups.entry(key(e)).or_default().add(e);
    }
    groups
        .into_iter()
        .map(|(k, tally)| tally.into_breakdown(k))
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Root mean square of shortfalls below `target`, over all returns.
fn downside_deviation(values: &[f64], target: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = values
        .iter()
        .map(|v| (v - target).min(0.0).powi(2))
        .sum();
    (sum_sq / values.len() as f64).sqrt()
}
