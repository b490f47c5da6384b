//! End-to-end backtest run: walk-forward predictions, quotes, staking, and
//! analysis over one event history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use walkline_core::{BacktestError, RunConfig, RunFailure};
use walkline_data::EventHistoryStore;

use crate::accuracy::{prediction_accuracy, DimensionAccuracy};
use crate::analyzer::{PerformanceAnalyzer, PerformanceReport};
use crate::ledger::BankrollLedger;
use crate::market::{resolve_seed, MarketLineSimulator, MarketQuote, QuoteSource};
use crate::predictor::Predictor;
use crate::staking::{StakeDecision, StakingEngine, StakingSummary};
use crate::walk_forward::{PredictionRecord, WalkForwardEvaluator};

/// One row of the prediction log: an event's prediction on one dimension,
/// the line it was compared to, and what the staking engine did with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionLogRow {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub dimension: String,
    pub predicted: f64,
    pub realized: f64,
    pub line: Option<f64>,
    pub edge: Option<f64>,
    pub side: Option<String>,
    pub confidence: Option<f64>,
    pub stake: Option<Decimal>,
    pub outcome: Option<String>,
    pub training_size: usize,
    pub fit_warning: Option<String>,
}

/// Run-level facts echoed into reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub predictor: String,
    pub events: usize,
    pub predictions: usize,
    pub first_prediction: Option<DateTime<Utc>>,
    pub last_prediction: Option<DateTime<Utc>>,
    pub retrains: usize,
    pub fit_failures: usize,
    pub stale_predictions: usize,
    pub simulated_quotes: usize,
}

/// Everything a completed run produces.
#[derive(Debug, Clone)]
pub struct RunResults {
    pub config: RunConfig,
    pub summary: RunSummary,
    pub predictions: Vec<PredictionRecord>,
    pub quotes: Vec<MarketQuote>,
    pub log: Vec<PredictionLogRow>,
    pub ledger: BankrollLedger,
    pub staking: StakingSummary,
    pub accuracy: Vec<DimensionAccuracy>,
    pub performance: PerformanceReport,
}

/// Runs a backtest for one predictor and configuration.
pub struct BacktestRunner<P: Predictor> {
    config: RunConfig,
    predictor: P,
}

impl<P: Predictor> BacktestRunner<P> {
    #[must_use]
    pub fn new(config: RunConfig, predictor: P) -> Self {
        Self { config, predictor }
    }

    /// Runs with simulated market lines seeded from `market.seed`. An
    /// unseeded run draws a seed first and records it in the echoed
    /// configuration.
    ///
    /// # Errors
    /// Returns `RunFailure` carrying the last fully processed event.
    pub fn run(mut self, store: &EventHistoryStore) -> Result<RunResults, RunFailure> {
        self.config.market.seed = Some(resolve_seed(self.config.market.seed));
        let mut simulator =
            MarketLineSimulator::new(&self.config.market.dimensions, self.config.market.seed)
                .map_err(|e| RunFailure::new(e, None, None))?;
        self.run_with_quotes(store, &mut simulator)
    }

    /// Runs against an explicit quote source.
    ///
    /// Events are processed one at a time: predict, quote, stake. A fatal
    /// error stops the run; entries appended before it remain valid.
    ///
    /// # Errors
    /// Returns `RunFailure` carrying the last fully processed event.
    pub fn run_with_quotes(
        self,
        store: &EventHistoryStore,
        quotes: &mut impl QuoteSource,
    ) -> Result<RunResults, RunFailure> {
        let config = self.config;
        let fail = |e: BacktestError, last: Option<(usize, DateTime<Utc>)>| {
            RunFailure::new(e, last.map(|(i, _)| i), last.map(|(_, ts)| ts))
        };

        config.validate().map_err(|e| fail(e, None))?;
        let dimension_count = config.market.dimensions.len();
        if store.outcome_names().len() != dimension_count {
            return Err(fail(
                BacktestError::InvalidConfig(format!(
                    "store has {} outcome columns, configuration declares {} dimensions",
                    store.outcome_names().len(),
                    dimension_count
                )),
                None,
            ));
        }

        let predictor_name = self.predictor.name().to_string();
        let engine = StakingEngine::new(&config.staking, &config.market.dimensions)
            .map_err(|e| fail(e, None))?;
        let analyzer = PerformanceAnalyzer::new(&config.analysis).map_err(|e| fail(e, None))?;
        let mut evaluator =
            WalkForwardEvaluator::new(store, self.predictor, &config.walk_forward)
                .map_err(|e| fail(e.into(), None))?;

        info!(
            predictor = %predictor_name,
            events = store.len(),
            train_window = config.walk_forward.train_window,
            retrain_every = config.walk_forward.retrain_every,
            min_edge = config.staking.min_edge,
            "backtest started"
        );

        let mut ledger = BankrollLedger::new(config.staking.starting_bankroll);
        let mut staking = StakingSummary::default();
        let mut predictions = Vec::with_capacity(evaluator.remaining());
        let mut quote_log = Vec::with_capacity(evaluator.remaining());
        let mut log = Vec::new();
        let mut last: Option<(usize, DateTime<Utc>)> = None;

        while let Some(step) = evaluator.step() {
            let record = step.map_err(|e| fail(e, last))?;
            let Some(event) = store.get(record.event_index) else {
                break;
            };
            let quote = quotes.quote(event);
            let decisions = engine
                .stake_event(&record, &quote, &mut ledger)
                .map_err(|e| fail(e.into(), last))?;

            for decision in &decisions {
                staking.record(decision);
            }
            log.extend(log_rows(&engine, &record, &quote, &decisions));
            last = Some((record.event_index, record.timestamp));
            predictions.push(record);
            quote_log.push(quote);
        }

        let summary = RunSummary {
            predictor: predictor_name,
            events: store.len(),
            predictions: predictions.len(),
            first_prediction: predictions.first().map(|r| r.timestamp),
            last_prediction: predictions.last().map(|r| r.timestamp),
            retrains: evaluator.retrains(),
            fit_failures: evaluator.fit_failures(),
            stale_predictions: predictions.iter().filter(|r| r.fit_warning.is_some()).count(),
            simulated_quotes: quote_log.iter().filter(|q| q.simulated).count(),
        };

        info!(
            considered = staking.considered,
            placed = staking.placed,
            below_threshold = staking.below_threshold,
            no_positive_kelly = staking.no_positive_kelly,
            final_bankroll = %ledger.final_bankroll(),
            "staking complete"
        );

        let accuracy = prediction_accuracy(
            &predictions,
            &quote_log,
            &config.market.dimensions,
            config.analysis.accuracy_tolerance,
        );
        let performance = analyzer.analyze(&ledger);

        Ok(RunResults {
            config,
            summary,
            predictions,
            quotes: quote_log,
            log,
            ledger,
            staking,
            accuracy,
            performance,
        })
    }
}

fn log_rows(
    engine: &StakingEngine,
    record: &PredictionRecord,
    quote: &MarketQuote,
    decisions: &[StakeDecision],
) -> Vec<PredictionLogRow> {
    engine
        .dimensions()
        .iter()
        .enumerate()
        .map(|(d, dim)| {
            let opportunity = engine.opportunity(record, quote, d);
            let entry = decisions.iter().find_map(|decision| match decision {
                StakeDecision::Bet(entry) if entry.bet_type == dim.name => Some(entry),
                _ => None,
            });
            PredictionLogRow {
                event_id: record.event_id.clone(),
                timestamp: record.timestamp,
                dimension: dim.name.clone(),
                predicted: record.predicted.get(d).copied().unwrap_or(f64::NAN),
                realized: record.realized.get(d).copied().unwrap_or(f64::NAN),
                line: quote.line(d),
                edge: opportunity.as_ref().map(|o| o.edge),
                side: opportunity.as_ref().map(|o| o.side.to_string()),
                confidence: opportunity.as_ref().map(|o| o.confidence),
                stake: entry.map(|e| e.stake),
                outcome: entry.map(|e| e.outcome.to_string()),
                training_size: record.training_size,
                fit_warning: record.fit_warning.clone(),
            }
        })
        .collect()
}
