//! Error taxonomy for walk-forward backtest runs.
//!
//! Integrity errors are always fatal and surface to the caller. Fit errors are
//! recoverable once a model has been fit successfully at least once.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

/// Malformed or unorderable input events. Fatal before any prediction is made.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataIntegrityError {
    /// A row could not be parsed.
    #[error("row {row}: {message}")]
    Malformed {
        /// 1-based data row number (header excluded).
        row: usize,
        /// What was wrong with the row.
        message: String,
    },

    /// A required column is absent from the header.
    #[error("missing required column: {0}")]
    MissingColumn(String),

    /// An outcome value needed for scoring is missing or not finite.
    #[error("event {event_id}: missing outcome '{outcome}'")]
    MissingOutcome {
        /// Identifier of the offending event.
        event_id: String,
        /// Name of the outcome dimension.
        outcome: String,
    },

    /// Events disagree on feature or outcome width.
    #[error("event {event_id}: expected {expected} {what}, found {found}")]
    WidthMismatch {
        /// Identifier of the offending event.
        event_id: String,
        /// "features" or "outcomes".
        what: &'static str,
        /// Width established by the first event.
        expected: usize,
        /// Width of this event.
        found: usize,
    },

    /// Two events share the same identifier.
    #[error("duplicate event id: {0}")]
    DuplicateId(String),

    /// A configured feature column is the id, timestamp or an outcome column.
    #[error("column '{0}' cannot be used as a feature")]
    ReservedFeatureColumn(String),

    /// No events were provided.
    #[error("event history is empty")]
    Empty,
}

/// The predictor could not be fit (or could not predict) on a window.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelFitError {
    /// Training window has no rows.
    #[error("training window is empty")]
    EmptyWindow,

    /// Normal equations are singular or the data is otherwise degenerate.
    #[error("degenerate training data: {0}")]
    Degenerate(String),

    /// `predict` was called before any successful `fit`.
    #[error("model has not been fit")]
    NotFitted,

    /// Feature vector width does not match the fitted model.
    #[error("feature width mismatch: model expects {expected}, got {found}")]
    FeatureWidth {
        /// Width the model was fit with.
        expected: usize,
        /// Width supplied.
        found: usize,
    },
}

/// An internally inconsistent bankroll transition. Always fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerIntegrityError {
    /// Sequence index is not previous + 1.
    #[error("sequence gap: expected {expected}, got {found}")]
    SequenceGap {
        /// Expected sequence index.
        expected: u64,
        /// Sequence index on the rejected entry.
        found: u64,
    },

    /// Entry does not start from the previous entry's closing bankroll.
    #[error("bankroll discontinuity at seq {sequence}: expected {expected}, got {found}")]
    Discontinuity {
        /// Sequence index of the rejected entry.
        sequence: u64,
        /// Previous bankroll_after (or the starting bankroll).
        expected: Decimal,
        /// bankroll_before on the rejected entry.
        found: Decimal,
    },

    /// bankroll_after != bankroll_before + profit.
    #[error("arithmetic mismatch at seq {sequence}: {before} + {profit} != {after}")]
    Arithmetic {
        /// Sequence index of the rejected entry.
        sequence: u64,
        /// bankroll_before.
        before: Decimal,
        /// Realized profit.
        profit: Decimal,
        /// Claimed bankroll_after.
        after: Decimal,
    },

    /// Stake is non-positive or exceeds the bankroll before the bet.
    #[error("invalid stake at seq {sequence}: {stake} (bankroll {bankroll})")]
    InvalidStake {
        /// Sequence index of the rejected entry.
        sequence: u64,
        /// Offending stake.
        stake: Decimal,
        /// bankroll_before.
        bankroll: Decimal,
    },

    /// Profit is inconsistent with the recorded outcome.
    #[error("profit {profit} inconsistent with outcome {outcome} at seq {sequence}")]
    OutcomeMismatch {
        /// Sequence index of the rejected entry.
        sequence: u64,
        /// Outcome label.
        outcome: String,
        /// Offending profit.
        profit: Decimal,
    },
}

/// Fewer events than the configured training window.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("insufficient data: {available} events available, at least {required} required")]
pub struct InsufficientDataError {
    /// Minimum number of events required (training window + 1).
    pub required: usize,
    /// Events actually loaded.
    pub available: usize,
}

/// Any error a backtest run can raise.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BacktestError {
    /// See [`DataIntegrityError`].
    #[error("data integrity: {0}")]
    DataIntegrity(#[from] DataIntegrityError),

    /// See [`ModelFitError`]. Only surfaces when the very first fit fails.
    #[error("model fit: {0}")]
    ModelFit(#[from] ModelFitError),

    /// See [`LedgerIntegrityError`].
    #[error("ledger integrity: {0}")]
    LedgerIntegrity(#[from] LedgerIntegrityError),

    /// See [`InsufficientDataError`].
    #[error("{0}")]
    InsufficientData(#[from] InsufficientDataError),

    /// A training window contained an event at or after the predicted event.
    #[error("look-ahead: model trained through {trained_through} used to predict event at {event_time}")]
    LookAhead {
        /// Latest timestamp in the training window.
        trained_through: DateTime<Utc>,
        /// Timestamp of the event being predicted.
        event_time: DateTime<Utc>,
    },

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A fatal error together with the last event that was fully processed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{source} (last processed event: {})", describe_progress(.last_index, .last_timestamp))]
pub struct RunFailure {
    /// Underlying error.
    pub source: BacktestError,
    /// Index of the last fully processed event, if any.
    pub last_index: Option<usize>,
    /// Timestamp of the last fully processed event, if any.
    pub last_timestamp: Option<DateTime<Utc>>,
}

impl RunFailure {
    /// Wraps an error with progress information.
    #[must_use]
    pub fn new(
        source: impl Into<BacktestError>,
        last_index: Option<usize>,
        last_timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            source: source.into(),
            last_index,
            last_timestamp,
        }
    }
}

fn describe_progress(index: &Option<usize>, timestamp: &Option<DateTime<Utc>>) -> String {
    match (*index, *timestamp) {
        (Some(i), Some(ts)) => format!("#{i} at {}", ts.format("%Y-%m-%d")),
        (Some(i), None) => format!("#{i}"),
        _ => "none".to_string(),
    }
}
