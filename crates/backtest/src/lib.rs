pub mod accuracy;
pub mod analyzer;
pub mod ledger;
pub mod market;
pub mod outcome;
pub mod pipeline;
pub mod predictor;
pub mod report;
pub mod staking;
pub mod walk_forward;

pub use accuracy::{prediction_accuracy, DimensionAccuracy};
pub use analyzer::{
    BasicMetrics, GroupBreakdown, KellyEstimate, PerformanceAnalyzer, PerformanceReport,
    RatioValue, RiskMetrics, StreakStats, ThresholdResult,
};
pub use ledger::{BankrollEntry, BankrollLedger, LedgerCursor};
pub use market::{resolve_seed, MarketLineSimulator, MarketQuote, ObservedQuotes, QuoteSource};
pub use outcome::{BetOpportunity, BetOutcome, Side};
pub use pipeline::{BacktestRunner, PredictionLogRow, RunResults, RunSummary};
pub use predictor::{MeanPredictor, Predictor, RidgeRegressor, TrainingWindow};
pub use report::{format_text_report, write_artifacts, ArtifactPaths, RunReport};
pub use staking::{SkipReason, StakeDecision, StakingEngine, StakingSummary};
pub use walk_forward::{EvaluatorState, PredictionRecord, WalkForwardEvaluator};
