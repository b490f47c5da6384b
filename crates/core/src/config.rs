use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::BacktestError;
use crate::kelly::AmericanOdds;

/// Complete configuration of one backtest run.
///
/// Echoed verbatim into every performance report so the report is
/// self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RunConfig {
    pub data: DataSettings,
    pub walk_forward: WalkForwardSettings,
    pub staking: StakingSettings,
    pub market: MarketSettings,
    pub analysis: AnalysisSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub id_column: String,
    pub timestamp_column: String,
    /// Explicit feature columns. `None` uses every column that is not the id,
    /// timestamp, or an outcome.
    pub feature_columns: Option<Vec<String>>,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            id_column: "event_id".to_string(),
            timestamp_column: "date".to_string(),
            feature_columns: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardSettings {
    /// Events required before the first prediction.
    pub train_window: usize,
    /// Events between retrains.
    pub retrain_every: usize,
}

impl Default for WalkForwardSettings {
    fn default() -> Self {
        Self {
            train_window: 500,
            retrain_every: 50,
        }
    }
}

/// Maps an edge (in outcome points) to a win probability.
///
/// `p = clamp(floor + slope × edge / edge_multiplier, floor, cap)`.
/// The slope is the tunable calibration parameter: how much win probability one
/// point of edge is worth on a dimension whose multiplier is 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationCurve {
    pub slope: f64,
    pub floor: f64,
    pub cap: f64,
}

impl Default for CalibrationCurve {
    fn default() -> Self {
        Self {
            slope: 0.01,
            floor: 0.5,
            cap: 0.95,
        }
    }
}

impl CalibrationCurve {
    /// Win probability for an edge magnitude, bounded to `[floor, cap]`.
    #[must_use]
    pub fn win_probability(&self, edge: f64, edge_multiplier: f64) -> f64 {
        let scale = if edge_multiplier > 0.0 {
            edge_multiplier
        } else {
            1.0
        };
        let raw = self.floor + self.slope * edge.max(0.0) / scale;
        if raw.is_nan() {
            return self.floor;
        }
        raw.clamp(self.floor, self.cap)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StakingSettings {
    pub starting_bankroll: Decimal,
    /// Minimum edge (outcome points) before a bet is considered.
    pub min_edge: f64,
    /// Fractional Kelly multiplier, in (0, 1].
    pub kelly_multiplier: Decimal,
    /// Per-bet stake cap as a fraction of bankroll, in (0, 1].
    pub stake_cap_fraction: Decimal,
    /// Smallest placeable stake.
    pub min_stake: Decimal,
    pub odds: AmericanOdds,
    pub calibration: CalibrationCurve,
    /// Edge at which the confidence score saturates at 1.0.
    pub confidence_saturation: f64,
}

impl Default for StakingSettings {
    fn default() -> Self {
        Self {
            starting_bankroll: Decimal::new(10_000, 0),
            min_edge: 1.0,
            kelly_multiplier: Decimal::new(25, 2),
            stake_cap_fraction: Decimal::new(5, 2),
            min_stake: Decimal::new(1, 2),
            odds: AmericanOdds::STANDARD,
            calibration: CalibrationCurve::default(),
            confidence_saturation: 10.0,
        }
    }
}

/// Kind of market an outcome dimension is traded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketKind {
    /// Signed margin (home minus away). Sides: home / away.
    Spread,
    /// Combined magnitude. Sides: over / under.
    Total,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionSettings {
    /// Outcome column name, e.g. "margin".
    pub name: String,
    pub kind: MarketKind,
    /// Std-dev of simulated market pricing error.
    pub noise_std: f64,
    /// Minimum quotable increment.
    #[serde(default = "default_increment")]
    pub increment: f64,
    /// Scales `min_edge` and the calibration curve for this dimension.
    #[serde(default = "default_edge_multiplier")]
    pub edge_multiplier: f64,
}

fn default_increment() -> f64 {
    0.5
}

fn default_edge_multiplier() -> f64 {
    1.0
}

impl DimensionSettings {
    #[must_use]
    pub fn spread(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: MarketKind::Spread,
            noise_std: 3.5,
            increment: 0.5,
            edge_multiplier: 1.0,
        }
    }

    #[must_use]
    pub fn total(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: MarketKind::Total,
            noise_std: 6.0,
            increment: 0.5,
            edge_multiplier: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSettings {
    /// Seed for the line simulator; `None` draws from entropy.
    pub seed: Option<u64>,
    pub dimensions: Vec<DimensionSettings>,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            seed: None,
            dimensions: vec![
                DimensionSettings::spread("margin"),
                DimensionSettings::total("total"),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub annual_risk_free_rate: f64,
    /// Used to convert the annual risk-free rate into a per-bet rate.
    pub bets_per_year: f64,
    pub edge_thresholds: Vec<f64>,
    /// Price assumed when estimating the historical Kelly fraction.
    pub assumed_odds: AmericanOdds,
    /// Predictions within this many points count as "accurate".
    pub accuracy_tolerance: f64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            annual_risk_free_rate: 0.04,
            bets_per_year: 200.0,
            edge_thresholds: vec![0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 4.0, 5.0],
            assumed_odds: AmericanOdds::STANDARD,
            accuracy_tolerance: 3.0,
        }
    }
}

impl RunConfig {
    /// Checks every range constraint on the configuration surface.
    ///
    /// # Errors
    /// Returns `BacktestError::InvalidConfig` naming the first violated setting.
    pub fn validate(&self) -> Result<(), BacktestError> {
        let invalid = |msg: String| Err(BacktestError::InvalidConfig(msg));
        let s = &self.staking;

        if self.walk_forward.train_window == 0 {
            return invalid("walk_forward.train_window must be > 0".into());
        }
        if self.walk_forward.retrain_every == 0 {
            return invalid("walk_forward.retrain_every must be > 0".into());
        }
        if !(s.min_edge >= 0.0 && s.min_edge.is_finite()) {
            return invalid(format!("staking.min_edge must be >= 0, got {}", s.min_edge));
        }
        if s.kelly_multiplier <= Decimal::ZERO || s.kelly_multiplier > Decimal::ONE {
            return invalid(format!(
                "staking.kelly_multiplier must be in (0, 1], got {}",
                s.kelly_multiplier
            ));
        }
        if s.stake_cap_fraction <= Decimal::ZERO || s.stake_cap_fraction > Decimal::ONE {
            return invalid(format!(
                "staking.stake_cap_fraction must be in (0, 1], got {}",
                s.stake_cap_fraction
            ));
        }
        if s.starting_bankroll <= Decimal::ZERO {
            return invalid(format!(
                "staking.starting_bankroll must be > 0, got {}",
                s.starting_bankroll
            ));
        }
        if s.min_stake <= Decimal::ZERO {
            return invalid("staking.min_stake must be > 0".into());
        }
        if s.odds.net_odds().is_none() {
            return invalid(format!("staking.odds {} is not a valid American price", s.odds.0));
        }
        let c = &s.calibration;
        if !(0.5 <= c.floor && c.floor <= c.cap && c.cap <= 0.95) {
            return invalid(format!(
                "staking.calibration bounds must satisfy 0.5 <= floor <= cap <= 0.95, got [{}, {}]",
                c.floor, c.cap
            ));
        }
        if !(c.slope >= 0.0 && c.slope.is_finite()) {
            return invalid("staking.calibration.slope must be >= 0".into());
        }
        if !(s.confidence_saturation > 0.0) {
            return invalid("staking.confidence_saturation must be > 0".into());
        }
        if self.market.dimensions.is_empty() {
            return invalid("market.dimensions must not be empty".into());
        }
        for (i, dim) in self.market.dimensions.iter().enumerate() {
            if self.market.dimensions[..i].iter().any(|d| d.name == dim.name) {
                return invalid(format!("market.dimensions[{}] is declared twice", dim.name));
            }
            if !(dim.noise_std >= 0.0 && dim.noise_std.is_finite()) {
                return invalid(format!("market.dimensions[{}].noise_std must be >= 0", dim.name));
            }
            if !(dim.increment > 0.0) {
                return invalid(format!("market.dimensions[{}].increment must be > 0", dim.name));
            }
            if !(dim.edge_multiplier > 0.0) {
                return invalid(format!(
                    "market.dimensions[{}].edge_multiplier must be > 0",
                    dim.name
                ));
            }
        }
        if let Some(features) = &self.data.feature_columns {
            let outcomes = self.outcome_names();
            if let Some(name) = features.iter().find(|f| {
                **f == self.data.id_column
                    || **f == self.data.timestamp_column
                    || outcomes.contains(*f)
            }) {
                return invalid(format!(
                    "data.feature_columns must not include '{name}' (id, timestamp or outcome column)"
                ));
            }
        }
        if !(self.analysis.bets_per_year > 0.0) {
            return invalid("analysis.bets_per_year must be > 0".into());
        }
        if self.analysis.assumed_odds.net_odds().is_none() {
            return invalid("analysis.assumed_odds is not a valid American price".into());
        }
        Ok(())
    }

    /// Names of the outcome dimensions, in declaration order.
    #[must_use]
    pub fn outcome_names(&self) -> Vec<String> {
        self.market.dimensions.iter().map(|d| d.name.clone()).collect()
    }
}
