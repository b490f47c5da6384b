//! Bet sides, outcomes, and settlement at vig-adjusted prices.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use walkline_core::MarketKind;

/// One of the two mutually exclusive directions on a line.
///
/// `Home` and `Over` are the high side (win when the realized outcome exceeds
/// the line); `Away` and `Under` are the low side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
    Over,
    Under,
}

impl Side {
    /// The side that wins when the realized outcome is above the line.
    #[must_use]
    pub fn high(kind: MarketKind) -> Self {
        match kind {
            MarketKind::Spread => Self::Home,
            MarketKind::Total => Self::Over,
        }
    }

    /// The side that wins when the realized outcome is below the line.
    #[must_use]
    pub fn low(kind: MarketKind) -> Self {
        match kind {
            MarketKind::Spread => Self::Away,
            MarketKind::Total => Self::Under,
        }
    }

    /// Side backed by a prediction relative to the line.
    ///
    /// A prediction exactly on the line backs the high side; callers filter
    /// zero edges before this matters.
    #[must_use]
    pub fn from_prediction(kind: MarketKind, prediction: f64, line: f64) -> Self {
        if prediction >= line {
            Self::high(kind)
        } else {
            Self::low(kind)
        }
    }

    #[must_use]
    pub fn is_high(self) -> bool {
        matches!(self, Self::Home | Self::Over)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Away => "away",
            Self::Over => "over",
            Self::Under => "under",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of a bet after settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BetOutcome {
    /// Realized outcome landed on the backed side of the line.
    Win,
    /// Realized outcome landed on the other side.
    Loss,
    /// Realized outcome equals the line; stake returned.
    Push,
}

impl BetOutcome {
    /// Resolves a side against a line.
    #[must_use]
    pub fn resolve(side: Side, line: f64, realized: f64) -> Self {
        if (realized - line).abs() < f64::EPSILON {
            Self::Push
        } else if (realized > line) == side.is_high() {
            Self::Win
        } else {
            Self::Loss
        }
    }

    /// Realized profit on `stake` at net odds `b`.
    ///
    /// A win pays `stake × b` rounded to the cent; a loss costs the stake; a
    /// push pays nothing.
    #[must_use]
    pub fn profit(self, stake: Decimal, net_odds: Decimal) -> Decimal {
        match self {
            Self::Win => (stake * net_odds).round_dp(2),
            Self::Loss => -stake,
            Self::Push => Decimal::ZERO,
        }
    }
}

impl std::fmt::Display for BetOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Win => "WIN",
            Self::Loss => "LOSS",
            Self::Push => "PUSH",
        })
    }
}

/// A candidate wager derived from one prediction and its market quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetOpportunity {
    pub event_id: String,
    /// Outcome dimension being wagered on, e.g. "margin".
    pub dimension: String,
    pub kind: MarketKind,
    pub side: Side,
    pub prediction: f64,
    pub line: f64,
    /// |prediction − line|, always ≥ 0.
    pub edge: f64,
    /// In [0, 1]: edge strength scaled by feature completeness.
    pub confidence: f64,
}

impl BetOpportunity {
    /// Builds an opportunity; confidence is clamped to [0, 1].
    #[must_use]
    pub fn new(
        event_id: &str,
        dimension: &str,
        kind: MarketKind,
        prediction: f64,
        line: f64,
        confidence: f64,
    ) -> Self {
        Self {
            event_id: event_id.to_string(),
            dimension: dimension.to_string(),
            kind,
            side: Side::from_prediction(kind, prediction, line),
            prediction,
            line,
            edge: (prediction - line).abs(),
            confidence: if confidence.is_nan() {
                0.0
            } else {
                confidence.clamp(0.0, 1.0)
            },
        }
    }
}
