//! Kelly Criterion sizing for fixed-odds (vig-priced) wagers.
//!
//! Sports lines are quoted at American odds, typically -110 on both sides. The
//! net odds multiplier `b` is the profit per unit staked on a win; the full
//! Kelly fraction for win probability `p` is:
//! ```text
//! f* = (p·b − q) / b      where q = 1 − p
//! ```
//! The sizer applies a fractional multiplier and a hard cap on the fraction of
//! bankroll risked on any single wager.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// American-style price, e.g. `-110` (risk 110 to win 100) or `+150`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AmericanOdds(pub i32);

impl AmericanOdds {
    /// The standard spread/total price.
    pub const STANDARD: Self = Self(-110);

    /// Net odds multiplier `b`: profit per one unit staked on a win.
    ///
    /// Returns `None` for prices in the open interval (-100, 100), which are
    /// not valid American quotes.
    ///
    /// # Examples
    /// ```
    /// use walkline_core::kelly::AmericanOdds;
    /// use rust_decimal_macros::dec;
    ///
    /// assert_eq!(AmericanOdds(150).net_odds(), Some(dec!(1.5)));
    /// assert_eq!(AmericanOdds(-200).net_odds(), Some(dec!(0.5)));
    /// ```
    #[must_use]
    pub fn net_odds(self) -> Option<Decimal> {
        match self.0 {
            n if n >= 100 => Some(Decimal::from(n) / Decimal::ONE_HUNDRED),
            n if n <= -100 => Some(Decimal::ONE_HUNDRED / Decimal::from(-n)),
            _ => None,
        }
    }
}

impl Default for AmericanOdds {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Full Kelly fraction `(p·b − q) / b`. May be negative.
#[must_use]
pub fn full_kelly(win_prob: Decimal, net_odds: Decimal) -> Decimal {
    if net_odds <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let q = Decimal::ONE - win_prob;
    (win_prob * net_odds - q) / net_odds
}

/// Win rate needed to break even at net odds `b`: `1 / (1 + b)`.
///
/// About 52.4% at -110.
#[must_use]
pub fn break_even_probability(net_odds: Decimal) -> Decimal {
    if net_odds <= Decimal::ZERO {
        return Decimal::ONE;
    }
    Decimal::ONE / (Decimal::ONE + net_odds)
}

/// Fractional Kelly sizer with a per-bet bankroll cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KellySizer {
    /// Fraction of full Kelly to use (0.25 = quarter Kelly). Must be in (0, 1].
    pub multiplier: Decimal,
    /// Maximum fraction of bankroll on any single bet. Must be in (0, 1].
    pub cap_fraction: Decimal,
    /// Smallest stake that will be placed; smaller stakes are skipped.
    pub min_stake: Decimal,
}

impl Default for KellySizer {
    fn default() -> Self {
        Self {
            multiplier: Decimal::new(25, 2),  // 0.25
            cap_fraction: Decimal::new(5, 2), // 0.05
            min_stake: Decimal::new(1, 2),    // one cent
        }
    }
}

/// Result of a sizing calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetDecision {
    /// Whether to place a bet.
    pub should_bet: bool,
    /// Recommended stake, rounded down to the cent.
    pub stake: Decimal,
    /// Full Kelly fraction before the multiplier and cap.
    pub full_kelly_fraction: Decimal,
    /// Fraction of bankroll actually applied (after multiplier and cap).
    pub applied_fraction: Decimal,
    /// Reason for the decision.
    pub reason: BetReason,
}

/// Reason for a sizing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BetReason {
    /// Bet placed at the fractional Kelly stake.
    PositiveEdge,
    /// Bet placed, but the stake was clipped by the bankroll cap.
    Capped,
    /// No bet: `p·b − q ≤ 0` under the probability model.
    NoPositiveKelly,
    /// No bet: stake rounded below the minimum unit, or a win on it would
    /// pay less than a cent.
    BelowMinimumStake,
    /// No bet: invalid inputs.
    InvalidInputs,
}

impl KellySizer {
    /// Creates a sizer with explicit parameters.
    #[must_use]
    pub fn new(multiplier: Decimal, cap_fraction: Decimal, min_stake: Decimal) -> Self {
        Self {
            multiplier,
            cap_fraction,
            min_stake,
        }
    }

    /// Sizes a wager.
    ///
    /// `stake = bankroll × min(max(0, f*) × multiplier, cap_fraction)`, rounded
    /// toward zero to the cent so the cap is never exceeded.
    ///
    /// # Examples
    /// ```
    /// use walkline_core::kelly::{KellySizer, BetReason};
    /// use rust_decimal_macros::dec;
    ///
    /// let sizer = KellySizer::new(dec!(1), dec!(1), dec!(0.01));
    /// // p = 0.6 at even money: f* = 0.2
    /// let decision = sizer.size(dec!(0.6), dec!(1), dec!(10000));
    /// assert!(decision.should_bet);
    /// assert_eq!(decision.stake, dec!(2000));
    /// assert_eq!(decision.reason, BetReason::PositiveEdge);
    /// ```
    #[must_use]
    pub fn size(&self, win_prob: Decimal, net_odds: Decimal, bankroll: Decimal) -> BetDecision {
        if win_prob < Decimal::ZERO
            || win_prob > Decimal::ONE
            || net_odds <= Decimal::ZERO
            || bankroll <= Decimal::ZERO
        {
            return Self::no_bet(Decimal::ZERO, BetReason::InvalidInputs);
        }

        let full = full_kelly(win_prob, net_odds);
        if full <= Decimal::ZERO {
            return Self::no_bet(full, BetReason::NoPositiveKelly);
        }

        let fractional = full * self.multiplier;
        let (applied, reason) = if fractional > self.cap_fraction {
            (self.cap_fraction, BetReason::Capped)
        } else {
            (fractional, BetReason::PositiveEdge)
        };

        let stake = (bankroll * applied).round_dp_with_strategy(2, RoundingStrategy::ToZero);
        if stake < self.min_stake || stake <= Decimal::ZERO {
            return Self::no_bet(full, BetReason::BelowMinimumStake);
        }
        // a winning stake must pay at least a cent after settlement rounding
        if (stake * net_odds).round_dp(2) <= Decimal::ZERO {
            return Self::no_bet(full, BetReason::BelowMinimumStake);
        }

        BetDecision {
            should_bet: true,
            stake,
            full_kelly_fraction: full,
            applied_fraction: applied,
            reason,
        }
    }

    fn no_bet(full_kelly_fraction: Decimal, reason: BetReason) -> BetDecision {
        BetDecision {
            should_bet: false,
            stake: Decimal::ZERO,
            full_kelly_fraction,
            applied_fraction: Decimal::ZERO,
            reason,
        }
    }
}
