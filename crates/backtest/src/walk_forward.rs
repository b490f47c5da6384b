//! Walk-forward evaluation with periodic retraining.
//!
//! The evaluator advances through the event history in timestamp order. At
//! index `i` it (re)fits the predictor on every event strictly earlier than
//! `events[i]` when a retrain is due, then predicts `events[i]`. Each
//! prediction is strictly out-of-sample.
//!
//! # States
//!
//! 1. `Initializing`: constructed, nothing fitted yet
//! 2. `Stepping`: emitting one record per event from index `W`
//! 3. `Done`: every event has been predicted

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkline_core::{BacktestError, InsufficientDataError, ModelFitError, WalkForwardSettings};
use walkline_data::EventHistoryStore;

use crate::predictor::{Predictor, TrainingWindow};

/// Out-of-sample prediction for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// Position of the event in the ordered store.
    pub event_index: usize,
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    /// One value per outcome dimension.
    pub predicted: Vec<f64>,
    /// Realized outcomes copied from the event.
    pub realized: Vec<f64>,
    /// Events the active model was fit on.
    pub training_size: usize,
    /// Share of the event's features that were present.
    pub completeness: f64,
    /// Set while a failed retrain left a stale model in use.
    pub fit_warning: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvaluatorState {
    Initializing,
    Stepping,
    Done,
}

/// Steps a predictor through history without ever showing it the future.
pub struct WalkForwardEvaluator<'a, P: Predictor> {
    store: &'a EventHistoryStore,
    predictor: P,
    train_window: usize,
    retrain_every: usize,
    state: EvaluatorState,
    next_index: usize,
    last_retrain: Option<usize>,
    /// Latest timestamp the active model was trained on.
    trained_through: Option<DateTime<Utc>>,
    training_size: usize,
    fit_warning: Option<String>,
    retrains: usize,
    fit_failures: usize,
}

impl<'a, P: Predictor> WalkForwardEvaluator<'a, P> {
    /// Prepares an evaluator.
    ///
    /// # Errors
    /// Returns `InsufficientDataError` unless the store holds more than
    /// `train_window` events (at least one must remain to predict).
    pub fn new(
        store: &'a EventHistoryStore,
        predictor: P,
        settings: &WalkForwardSettings,
    ) -> Result<Self, InsufficientDataError> {
        let required = settings.train_window + 1;
        if store.len() < required {
            return Err(InsufficientDataError {
                required,
                available: store.len(),
            });
        }
        Ok(Self {
            store,
            predictor,
            train_window: settings.train_window,
            retrain_every: settings.retrain_every.max(1),
            state: EvaluatorState::Initializing,
            next_index: settings.train_window,
            last_retrain: None,
            trained_through: None,
            training_size: 0,
            fit_warning: None,
            retrains: 0,
            fit_failures: 0,
        })
    }

    #[must_use]
    pub fn state(&self) -> EvaluatorState {
        self.state
    }

    /// Successful fits so far.
    #[must_use]
    pub fn retrains(&self) -> usize {
        self.retrains
    }

    /// Retrains that fell back to the stale model.
    #[must_use]
    pub fn fit_failures(&self) -> usize {
        self.fit_failures
    }

    /// Events remaining to predict.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.store.len().saturating_sub(self.next_index)
    }

    /// Produces the next prediction, or `None` once every event is done.
    ///
    /// # Errors
    /// A first fit that fails, a failing `predict`, or a look-ahead
    /// violation is fatal; the evaluator then stops at `Done`.
    pub fn step(&mut self) -> Option<Result<PredictionRecord, BacktestError>> {
        if self.state == EvaluatorState::Done {
            return None;
        }
        let Some(event) = self.store.get(self.next_index) else {
            self.state = EvaluatorState::Done;
            info!(
                retrains = self.retrains,
                fit_failures = self.fit_failures,
                "walk-forward evaluation complete"
            );
            return None;
        };
        self.state = EvaluatorState::Stepping;
        let index = self.next_index;

        let due = self
            .last_retrain
            .map_or(true, |last| index - last >= self.retrain_every);
        if due {
            if let Err(e) = self.retrain(index, event.timestamp) {
                self.state = EvaluatorState::Done;
                return Some(Err(e));
            }
        }

        // no-look-ahead: the active model must predate this event
        match self.trained_through {
            Some(through) if through < event.timestamp => {}
            Some(through) => {
                self.state = EvaluatorState::Done;
                return Some(Err(BacktestError::LookAhead {
                    trained_through: through,
                    event_time: event.timestamp,
                }));
            }
            None => {
                self.state = EvaluatorState::Done;
                return Some(Err(ModelFitError::NotFitted.into()));
            }
        }

        let predicted = match self.predictor.predict(&event.features) {
            Ok(p) => p,
            Err(e) => {
                self.state = EvaluatorState::Done;
                return Some(Err(e.into()));
            }
        };

        self.next_index += 1;
        Some(Ok(PredictionRecord {
            event_index: index,
            event_id: event.id.clone(),
            timestamp: event.timestamp,
            predicted,
            realized: event.outcomes.clone(),
            training_size: self.training_size,
            completeness: event.completeness(),
            fit_warning: self.fit_warning.clone(),
        }))
    }

    /// Runs to completion and returns every record in event order.
    ///
    /// # Errors
    /// Returns the first fatal error from [`Self::step`].
    pub fn run(mut self) -> Result<Vec<PredictionRecord>, BacktestError> {
        let mut records = Vec::with_capacity(self.remaining());
        while let Some(record) = self.step() {
            records.push(record?);
        }
        Ok(records)
    }

    /// Fits a candidate on `slice_before(cutoff)`. A failure is retried once;
    /// if it fails again the previous model stays active and subsequent
    /// records carry a warning. Failure with no previous model is fatal.
    fn retrain(&mut self, index: usize, cutoff: DateTime<Utc>) -> Result<(), BacktestError> {
        self.last_retrain = Some(index);
        let window = TrainingWindow::new(self.store.slice_before(cutoff));

        if let Some(max) = window.max_timestamp() {
            if max >= cutoff {
                return Err(BacktestError::LookAhead {
                    trained_through: max,
                    event_time: cutoff,
                });
            }
        }

        let mut outcome = Err(ModelFitError::EmptyWindow);
        for attempt in 1..=2 {
            let mut candidate = self.predictor.clone();
            outcome = candidate.fit(&window).map(|()| candidate);
            match &outcome {
                Ok(_) => break,
                Err(e) => debug!(index, attempt, error = %e, "fit attempt failed"),
            }
        }

        match outcome {
            Ok(fitted) => {
                self.predictor = fitted;
                self.trained_through = window.max_timestamp();
                self.training_size = window.len();
                self.fit_warning = None;
                self.retrains += 1;
                info!(
                    index,
                    training_size = window.len(),
                    model = self.predictor.name(),
                    "model retrained"
                );
                Ok(())
            }
            Err(e) if self.trained_through.is_some() => {
                self.fit_failures += 1;
                warn!(
                    index,
                    training_size = window.len(),
                    error = %e,
                    "retrain failed, keeping previous model"
                );
                self.fit_warning = Some(format!("stale model: retrain at index {index} failed: {e}"));
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Minimum events required before the first prediction.
    #[must_use]
    pub fn train_window(&self) -> usize {
        self.train_window
    }
}
