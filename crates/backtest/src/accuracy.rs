//! Prediction accuracy per outcome dimension, independent of staking.

use serde::{Deserialize, Serialize};
use walkline_core::{pearson_correlation, DimensionSettings, MarketKind};

use crate::market::MarketQuote;
use crate::walk_forward::PredictionRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionAccuracy {
    pub dimension: String,
    /// Records with a finite prediction and realized value.
    pub count: usize,
    pub mae: f64,
    pub rmse: f64,
    /// Share of predictions with the same sign as the realized value.
    /// Only meaningful for signed (spread) dimensions.
    pub direction_accuracy: Option<f64>,
    /// Share of predictions within the configured tolerance.
    pub within_tolerance: f64,
    pub correlation: f64,
    /// Share of events where the model was strictly closer to the realized
    /// value than the market line.
    pub beat_market_rate: f64,
    /// Mean absolute error of the market line, for comparison.
    pub market_mae: f64,
}

/// Computes accuracy for every dimension.
///
/// `quotes` is matched to `records` by position; a missing quote excludes the
/// record from the market comparison only.
#[must_use]
pub fn prediction_accuracy(
    records: &[PredictionRecord],
    quotes: &[MarketQuote],
    dimensions: &[DimensionSettings],
    tolerance: f64,
) -> Vec<DimensionAccuracy> {
    dimensions
        .iter()
        .enumerate()
        .map(|(d, settings)| dimension_accuracy(records, quotes, d, settings, tolerance))
        .collect()
}

fn dimension_accuracy(
    records: &[PredictionRecord],
    quotes: &[MarketQuote],
    d: usize,
    settings: &DimensionSettings,
    tolerance: f64,
) -> DimensionAccuracy {
    let mut predicted = Vec::with_capacity(records.len());
    let mut realized = Vec::with_capacity(records.len());
    let mut abs_err_sum = 0.0;
    let mut sq_err_sum = 0.0;
    let mut within = 0usize;
    let mut same_sign = 0usize;
    let mut compared = 0usize;
    let mut beat = 0usize;
    let mut market_err_sum = 0.0;

    for (i, record) in records.iter().enumerate() {
        let (Some(&p), Some(&r)) = (record.predicted.get(d), record.realized.get(d)) else {
            continue;
        };
        if !p.is_finite() || !r.is_finite() {
            continue;
        }
        let err = (p - r).abs();
        predicted.push(p);
        realized.push(r);
        abs_err_sum += err;
        sq_err_sum += err * err;
        if err <= tolerance {
            within += 1;
        }
        if (p > 0.0) == (r > 0.0) {
            same_sign += 1;
        }
        if let Some(line) = quotes.get(i).and_then(|q| q.line(d)).filter(|l| l.is_finite()) {
            compared += 1;
            let market_err = (line - r).abs();
            market_err_sum += market_err;
            if err < market_err {
                beat += 1;
            }
        }
    }

    let n = predicted.len();
    let rate = |k: usize, of: usize| if of == 0 { 0.0 } else { k as f64 / of as f64 };

    DimensionAccuracy {
        dimension: settings.name.clone(),
        count: n,
        mae: if n == 0 { 0.0 } else { abs_err_sum / n as f64 },
        rmse: if n == 0 {
            0.0
        } else {
            (sq_err_sum / n as f64).sqrt()
        },
        direction_accuracy: (settings.kind == MarketKind::Spread).then(|| rate(same_sign, n)),
        within_tolerance: rate(within, n),
        correlation: pearson_correlation(&predicted, &realized),
        beat_market_rate: rate(beat, compared),
        market_mae: if compared == 0 {
            0.0
        } else {
            market_err_sum / compared as f64
        },
    }
}
