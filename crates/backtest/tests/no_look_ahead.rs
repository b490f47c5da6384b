//! Every prediction must come from a model fit only on strictly earlier events.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use walkline_backtest::{Predictor, TrainingWindow, WalkForwardEvaluator};
use walkline_core::{ModelFitError, WalkForwardSettings};
use walkline_data::{Event, EventHistoryStore};

#[derive(Debug, Default)]
struct Log {
    /// Timestamps of each window handed to `fit`.
    fits: Vec<Vec<DateTime<Utc>>>,
    /// (timestamps of the active model's window, predicted event timestamp)
    predictions: Vec<(Vec<DateTime<Utc>>, DateTime<Utc>)>,
}

/// Records what it was trained on; feature 0 carries the event timestamp so
/// `predict` can report which event it was asked about.
#[derive(Clone, Default)]
struct Recorder {
    log: Rc<RefCell<Log>>,
    trained_on: Vec<DateTime<Utc>>,
}

fn encode(ts: DateTime<Utc>) -> f64 {
    ts.timestamp() as f64
}

fn decode(x: f64) -> DateTime<Utc> {
    Utc.timestamp_opt(x as i64, 0).unwrap()
}

impl Predictor for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn fit(&mut self, window: &TrainingWindow<'_>) -> Result<(), ModelFitError> {
        if window.is_empty() {
            return Err(ModelFitError::EmptyWindow);
        }
        self.trained_on = window.events().iter().map(|e| e.timestamp).collect();
        self.log.borrow_mut().fits.push(self.trained_on.clone());
        Ok(())
    }

    fn predict(&self, features: &[f64]) -> Result<Vec<f64>, ModelFitError> {
        self.log
            .borrow_mut()
            .predictions
            .push((self.trained_on.clone(), decode(features[0])));
        Ok(vec![0.0])
    }
}

/// Shuffled events on a calendar with frequent same-day ties.
fn shuffled_store(rng: &mut ChaCha8Rng, n: usize) -> EventHistoryStore {
    let start = Utc.with_ymd_and_hms(2023, 10, 1, 0, 0, 0).unwrap();
    let mut day = 0i64;
    let mut events: Vec<Event> = (0..n)
        .map(|i| {
            // at most three events share a day
            day += if i % 3 == 0 { 1 } else { rng.gen_range(0..2) };
            let ts = start + Duration::days(day);
            Event::new(format!("e{i}"), ts, vec![encode(ts)], vec![rng.gen_range(-20.0..20.0)])
        })
        .collect();
    for i in (1..events.len()).rev() {
        let j = rng.gen_range(0..=i);
        events.swap(i, j);
    }
    EventHistoryStore::from_events(events, vec!["ts".into()], vec!["margin".into()]).unwrap()
}

#[test]
fn fit_never_sees_the_predicted_event_or_later() {
    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    for (n, train_window, retrain_every) in [(60, 10, 1), (80, 20, 7), (120, 30, 50), (40, 5, 3)] {
        let store = shuffled_store(&mut rng, n);
        let recorder = Recorder::default();
        let log = recorder.log.clone();
        let settings = WalkForwardSettings {
            train_window,
            retrain_every,
        };

        let records = WalkForwardEvaluator::new(&store, recorder, &settings)
            .unwrap()
            .run()
            .unwrap();

        let log = log.borrow();
        assert_eq!(records.len(), n - train_window);
        assert_eq!(log.predictions.len(), records.len());
        assert!(!log.fits.is_empty());

        for ((trained_on, predicted_at), record) in log.predictions.iter().zip(&records) {
            assert_eq!(*predicted_at, record.timestamp);
            let max = trained_on.iter().max().unwrap();
            assert!(
                *max < *predicted_at,
                "model trained through {max} predicted event at {predicted_at}"
            );
        }
    }
}

#[test]
fn retrain_window_is_every_strictly_earlier_event() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let store = shuffled_store(&mut rng, 50);
    let recorder = Recorder::default();
    let log = recorder.log.clone();
    let settings = WalkForwardSettings {
        train_window: 10,
        retrain_every: 1,
    };
    let records = WalkForwardEvaluator::new(&store, recorder, &settings)
        .unwrap()
        .run()
        .unwrap();

    let log = log.borrow();
    for (fit, record) in log.fits.iter().zip(&records) {
        let expected = store.slice_before(record.timestamp).len();
        assert_eq!(fit.len(), expected);
        assert_eq!(record.training_size, expected);
    }
}
